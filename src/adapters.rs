use std::pin::Pin;
use std::time::{Duration, Instant};

use crate::error::{FetchError, NotificationError};
use crate::ports;
use crate::types::{Importance, NotificationId, NotificationPayload};

#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    started: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ports::Clock for MonotonicClock {
    fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Posts to the desktop notification service.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    app_name: String,
}

impl DesktopNotifier {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }
}

impl ports::NotificationSink for DesktopNotifier {
    type Fut<'a>
        = Pin<Box<dyn Future<Output = Result<(), NotificationError>> + Send + 'a>>
    where
        Self: 'a;

    fn post<'a>(&'a self, id: NotificationId, payload: &'a NotificationPayload) -> Self::Fut<'a> {
        let app_name = self.app_name.clone();
        let payload = payload.clone();
        Box::pin(async move {
            // The notification daemon call is synchronous.
            tokio::task::spawn_blocking(move || show(&app_name, id, &payload))
                .await
                .map_err(|err| NotificationError(format!("notification task failed: {err}")))?
        })
    }
}

fn show(
    app_name: &str,
    id: NotificationId,
    payload: &NotificationPayload,
) -> Result<(), NotificationError> {
    let mut notification = notify_rust::Notification::new();
    notification
        .appname(app_name)
        .summary(&payload.title)
        .body(&format!("{}\n{}", payload.body, payload.deep_link));

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        let urgency = match payload.importance {
            Importance::High => notify_rust::Urgency::Critical,
            Importance::Default => notify_rust::Urgency::Normal,
        };
        notification.id(id.0).urgency(urgency);
    }
    #[cfg(not(all(unix, not(target_os = "macos"))))]
    let _ = (id, payload.importance == Importance::High);

    notification
        .show()
        .map(|_| ())
        .map_err(|err| NotificationError(err.to_string()))
}

/// Fetches the table over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpTableFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTableFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, timeout })
    }

    fn map_error(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else if err.is_body() || err.is_decode() {
            FetchError::Body(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

impl ports::TableFetcher for HttpTableFetcher {
    type Fut<'a>
        = Pin<Box<dyn Future<Output = Result<String, FetchError>> + Send + 'a>>
    where
        Self: 'a;

    fn fetch<'a>(&'a self, url: &'a str) -> Self::Fut<'a> {
        Box::pin(async move {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|err| self.map_error(err))?;
            let response = response
                .error_for_status()
                .map_err(|err| self.map_error(err))?;
            response.text().await.map_err(|err| self.map_error(err))
        })
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use crate::ports::TableFetcher;

    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn fetch__should_return_body_verbatim() {
        // Given
        let base = serve(Router::new().route(
            "/tables/html",
            get(|| async { "<html><body>TEST</body></html>" }),
        ))
        .await;
        let fetcher = HttpTableFetcher::new(Duration::from_secs(5)).expect("client");

        // When
        let html = fetcher
            .fetch(&format!("{base}/tables/html"))
            .await
            .expect("fetch");

        // Then
        assert_eq!(html, "<html><body>TEST</body></html>");
    }

    #[tokio::test]
    async fn fetch__should_map_non_success_to_status() {
        // Given
        let base = serve(Router::new().route(
            "/tables/html",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down for maintenance") }),
        ))
        .await;
        let fetcher = HttpTableFetcher::new(Duration::from_secs(5)).expect("client");

        // When
        let result = fetcher.fetch(&format!("{base}/tables/html")).await;

        // Then
        assert_eq!(result, Err(FetchError::Status(503)));
    }

    #[tokio::test]
    async fn fetch__should_map_slow_server_to_timeout() {
        // Given
        let base = serve(Router::new().route(
            "/tables/html",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                "late"
            }),
        ))
        .await;
        let timeout = Duration::from_millis(50);
        let fetcher = HttpTableFetcher::new(timeout).expect("client");

        // When
        let result = fetcher.fetch(&format!("{base}/tables/html")).await;

        // Then
        assert_eq!(result, Err(FetchError::Timeout(timeout)));
    }

    #[tokio::test]
    async fn fetch__should_map_refused_connection_to_network() {
        // Given
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);
        let fetcher = HttpTableFetcher::new(Duration::from_secs(5)).expect("client");

        // When
        let result = fetcher.fetch(&format!("http://{addr}/tables/html")).await;

        // Then
        assert!(matches!(result, Err(FetchError::Network(_))));
    }
}
