use crate::ports;
use crate::state::AppState;

use axum::Router;
use axum::routing::{get, post};

mod status;
mod table;

pub fn app<F: ports::TableFetcher>(state: AppState<F>) -> Router {
    Router::new()
        .route("/", get(table::table_view::<F>))
        .route("/refresh", post(table::table_refresh::<F>))
        .route("/api/status", get(status::status::<F>))
        .route("/health", get(health))
        .with_state(state)
}

pub(crate) async fn health() -> &'static str {
    "ok"
}
