pub mod adapters;
pub mod app;
pub mod backoff;
pub mod config;
pub mod error;
pub mod notifier;
pub mod ports;
pub mod pusher;
pub mod service;
pub mod state;
pub mod subscriber;
mod templates;
#[cfg(test)]
mod testing;
pub mod types;
pub mod view;

use crate::adapters::{DesktopNotifier, HttpTableFetcher, MonotonicClock};
use crate::backoff::ReconnectConfig;
use crate::config::AppConfig;
use crate::error::{FetchError, NotificationError, ServeError};
use crate::notifier::{DataAvailableHandler, NotificationIds, Notifier, Refresher};
use crate::ports::{NotificationSink, TableFetcher};
use crate::pusher::PusherTransport;
use crate::service::{ServiceExit, Supervisor};
use crate::state::AppState;
use crate::types::{NotificationId, NotificationPayload};

use std::sync::Arc;
use tracing::{error, info, warn};

pub const APP_NAME: &str = "Tabela diária COVID-19";

/// Runs the listener service and the local table view until Ctrl-C.
pub async fn serve(config: AppConfig) -> Result<(), ServeError> {
    let fetcher = HttpTableFetcher::new(config.fetch_timeout)?;
    let (view, _view_task) = view::spawn_view();
    let refresher = Refresher::new(
        fetcher,
        config.table_url.clone(),
        config.fetch_timeout,
        view,
    );
    let notifier = Notifier::new(
        DesktopNotifier::new(APP_NAME),
        NotificationIds::new(config.notification_ids, MonotonicClock::new()),
        config.view_url(),
    );
    let handler = DataAvailableHandler::new(notifier, refresher.clone()).into_event_handler();

    let reconnect = ReconnectConfig::default();
    let supervisor = Supervisor::new(
        move || PusherTransport::new(reconnect),
        config.subscription.clone(),
        handler,
        reconnect,
    );
    let listener_status = supervisor.status();
    let (trigger, shutdown) = service::shutdown_channel();
    let supervisor_task = tokio::spawn(supervisor.run(shutdown));

    let state = AppState {
        refresher,
        activation: Arc::default(),
        listener: listener_status,
        subscription: Arc::new(config.subscription.clone()),
    };
    let listener = tokio::net::TcpListener::bind(config.view_addr)
        .await
        .map_err(|source| ServeError::Bind {
            addr: config.view_addr,
            source,
        })?;
    info!(url = %config.view_url(), "serving table view");

    let served = axum::serve(listener, app::app(state))
        .with_graceful_shutdown(async move {
            ctrl_c().await;
            info!("shutting down");
            trigger.trigger();
        })
        .await;

    match supervisor_task.await {
        Ok(ServiceExit::Terminal(err)) => error!(%err, "listener had stopped for good"),
        Ok(exit) => info!(?exit, "listener stopped"),
        Err(err) => warn!(%err, "listener task failed"),
    }
    served.map_err(ServeError::Server)
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "cannot listen for ctrl-c; only a kill will stop the process");
        std::future::pending::<()>().await;
    }
}

/// One-shot fetch of the table at `url`.
pub async fn fetch_table(config: &AppConfig, url: &str) -> Result<String, FetchError> {
    let fetcher = HttpTableFetcher::new(config.fetch_timeout)
        .map_err(|err| FetchError::Network(err.to_string()))?;
    fetcher.fetch(url).await
}

/// Posts one data-available notification, as an event would.
pub async fn notify_once(config: &AppConfig) -> Result<NotificationId, NotificationError> {
    let ids = NotificationIds::new(config.notification_ids, MonotonicClock::new());
    let id = ids.next();
    let payload = NotificationPayload::data_available(&config.view_url());
    DesktopNotifier::new(APP_NAME).post(id, &payload).await?;
    Ok(id)
}
