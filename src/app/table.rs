use crate::ports;
use crate::state::AppState;
use crate::templates::TableUnavailableTemplate;
use crate::types::Activation;

use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use tracing::{debug, error};

pub(crate) const REFRESH_ERROR_HEADER: HeaderName = HeaderName::from_static("x-refresh-error");

pub(crate) async fn table_view<F: ports::TableFetcher>(
    State(state): State<AppState<F>>,
    Query(activation): Query<Activation>,
) -> Response {
    if state.activation.needs_refresh(activation) {
        debug!(?activation, "activation triggers a refresh");
        refresh(&state).await;
    }
    render(&state)
}

/// Retry affordance for the error page.
pub(crate) async fn table_refresh<F: ports::TableFetcher>(
    State(state): State<AppState<F>>,
) -> Redirect {
    refresh(&state).await;
    Redirect::to("/")
}

async fn refresh<F: ports::TableFetcher>(state: &AppState<F>) {
    // Runs detached so a closed browser tab cannot cancel a fetch halfway.
    if let Err(err) = state.refresher.refresh().await {
        error!(%err, "refresh task failed");
    }
}

fn render<F: ports::TableFetcher>(state: &AppState<F>) -> Response {
    let snapshot = state.refresher.view().snapshot();
    let last_error = snapshot.last_error.map(|err| err.to_string());

    let Some(html) = snapshot.content else {
        let status = if last_error.is_some() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::OK
        };
        let page = TableUnavailableTemplate {
            app_name: crate::APP_NAME,
            error: last_error,
        };
        return (status, page).into_response();
    };

    let mut response = (
        [(CONTENT_TYPE, HeaderValue::from_static("text/html;charset=utf-8"))],
        html,
    )
        .into_response();
    if let Some(err) = last_error
        && let Ok(value) = HeaderValue::from_str(&err)
    {
        response.headers_mut().insert(REFRESH_ERROR_HEADER, value);
    }
    response
}
