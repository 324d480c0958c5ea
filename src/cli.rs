use clap::{Args, Parser, Subcommand};
use dailytable::config::{AppConfig, NotificationIdScheme};
use dailytable::error::ConfigError;
use dailytable::types::ChannelSubscription;
use serde::Deserialize;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

#[allow(clippy::large_enum_variant)]
pub(crate) enum RunOutcome {
    Serve(AppConfig),
    Exit(i32),
}

pub(crate) async fn run(cli: Cli) -> RunOutcome {
    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "invalid configuration");
            return RunOutcome::Exit(2);
        }
    };

    match cli.command {
        Some(Command::Fetch(args)) => RunOutcome::Exit(run_fetch(&config, args).await),
        Some(Command::NotifyTest) => RunOutcome::Exit(run_notify_test(&config).await),
        None => RunOutcome::Serve(config),
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "dailytable",
    version,
    about = "Desktop listener for the daily COVID-19 table for Portugal"
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    /// TOML file with defaults; flags and environment take precedence.
    #[arg(long, env = "DAILYTABLE_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, env = "DAILYTABLE_APP_KEY")]
    app_key: Option<String>,
    #[arg(long, env = "DAILYTABLE_CLUSTER")]
    cluster: Option<String>,
    #[arg(long, env = "DAILYTABLE_CHANNEL")]
    channel: Option<String>,
    #[arg(long, env = "DAILYTABLE_EVENT")]
    event: Option<String>,
    #[arg(long, env = "DAILYTABLE_TABLE_URL")]
    table_url: Option<String>,
    #[arg(long, env = "DAILYTABLE_FETCH_TIMEOUT", value_name = "SECONDS")]
    fetch_timeout: Option<u64>,
    #[arg(long, env = "DAILYTABLE_VIEW_ADDR")]
    view_addr: Option<SocketAddr>,
    #[arg(long, env = "DAILYTABLE_NOTIFICATION_IDS", value_enum)]
    notification_ids: Option<NotificationIdScheme>,
    #[arg(short, long, global = true)]
    pub(crate) verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the table once and print it.
    Fetch(FetchArgs),
    /// Post one data-available notification.
    NotifyTest,
}

#[derive(Args, Debug)]
struct FetchArgs {
    #[arg(long, value_name = "DD-MM-YYYY")]
    date: Option<String>,
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct FileConfig {
    app_key: Option<String>,
    cluster: Option<String>,
    channel: Option<String>,
    event: Option<String>,
    table_url: Option<String>,
    fetch_timeout: Option<u64>,
    view_addr: Option<SocketAddr>,
    notification_ids: Option<NotificationIdScheme>,
}

fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let file_error = |reason: String| ConfigError::File {
        path: path.display().to_string(),
        reason,
    };
    let raw = std::fs::read_to_string(path).map_err(|err| file_error(err.to_string()))?;
    toml::from_str(&raw).map_err(|err| file_error(err.to_string()))
}

fn resolve_config(cli: &Cli) -> Result<AppConfig, ConfigError> {
    let file = match cli.config.as_deref() {
        Some(path) => load_file_config(path)?,
        None => FileConfig::default(),
    };
    let defaults = AppConfig::default();

    let config = AppConfig {
        subscription: ChannelSubscription {
            app_key: pick(&cli.app_key, file.app_key, defaults.subscription.app_key),
            cluster: pick(&cli.cluster, file.cluster, defaults.subscription.cluster),
            channel: pick(&cli.channel, file.channel, defaults.subscription.channel),
            event: pick(&cli.event, file.event, defaults.subscription.event),
        },
        table_url: pick(&cli.table_url, file.table_url, defaults.table_url),
        fetch_timeout: cli
            .fetch_timeout
            .or(file.fetch_timeout)
            .map(Duration::from_secs)
            .unwrap_or(defaults.fetch_timeout),
        view_addr: cli
            .view_addr
            .or(file.view_addr)
            .unwrap_or(defaults.view_addr),
        notification_ids: cli
            .notification_ids
            .or(file.notification_ids)
            .unwrap_or(defaults.notification_ids),
    };
    config.validate()?;
    Ok(config)
}

fn pick(flag: &Option<String>, file: Option<String>, default: String) -> String {
    flag.as_deref()
        .map(|value| value.trim().to_string())
        .or(file)
        .unwrap_or(default)
}

async fn run_fetch(config: &AppConfig, args: FetchArgs) -> i32 {
    let url = match config.table_url_for(args.date.as_deref()) {
        Ok(url) => url,
        Err(err) => {
            error!(%err, "invalid fetch arguments");
            return 2;
        }
    };
    let html = match dailytable::fetch_table(config, &url).await {
        Ok(html) => html,
        Err(err) => {
            error!(%err, url = %url, "fetch failed");
            return 1;
        }
    };

    let written = match args.output {
        Some(path) => std::fs::write(&path, &html)
            .map(|()| info!(path = %path.display(), "table written")),
        None => std::io::stdout().lock().write_all(html.as_bytes()),
    };
    match written {
        Ok(()) => 0,
        Err(err) => {
            error!(%err, "failed to write table");
            1
        }
    }
}

async fn run_notify_test(config: &AppConfig) -> i32 {
    match dailytable::notify_once(config).await {
        Ok(id) => {
            info!(id = id.0, "notification posted");
            0
        }
        Err(err) => {
            error!(%err, "notification failed");
            1
        }
    }
}
