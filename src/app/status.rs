use crate::ports;
use crate::service::ListenerStatus;
use crate::state::AppState;

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;

#[derive(Serialize)]
pub(crate) struct StatusResponse {
    pub(crate) has_content: bool,
    pub(crate) last_error: Option<String>,
    pub(crate) rendered_at: Option<String>,
    pub(crate) revision: u64,
    pub(crate) connected: bool,
    pub(crate) listener: ListenerStatus,
    pub(crate) subscription: SubscriptionInfo,
}

#[derive(Serialize)]
pub(crate) struct SubscriptionInfo {
    pub(crate) cluster: String,
    pub(crate) channel: String,
    pub(crate) event: String,
}

pub(crate) async fn status<F: ports::TableFetcher>(
    State(state): State<AppState<F>>,
) -> Json<StatusResponse> {
    let snapshot = state.refresher.view().snapshot();
    let listener = state.listener.borrow().clone();
    Json(StatusResponse {
        has_content: snapshot.content.is_some(),
        last_error: snapshot.last_error.map(|err| err.to_string()),
        rendered_at: snapshot
            .rendered_at
            .and_then(|at| at.format(&Rfc3339).ok()),
        revision: snapshot.revision,
        connected: listener.is_connected(),
        listener,
        subscription: SubscriptionInfo {
            cluster: state.subscription.cluster.clone(),
            channel: state.subscription.channel.clone(),
            event: state.subscription.event.clone(),
        },
    })
}
