mod cli;

use clap::Parser;
use tracing::error;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();
    init_logging(cli.verbose);

    match cli::run(cli).await {
        cli::RunOutcome::Serve(config) => {
            if let Err(err) = dailytable::serve(config).await {
                error!(%err, "dailytable stopped");
                std::process::exit(1);
            }
        }
        cli::RunOutcome::Exit(code) => std::process::exit(code),
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(filter)
        // stdout carries `fetch` output.
        .with(fmt::layer().with_writer(std::io::stderr).with_target(verbose))
        .init();
}
