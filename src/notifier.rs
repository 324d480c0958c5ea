//! Turns one "data available" event into one notification and one refresh.

use crate::config::NotificationIdScheme;
use crate::error::FetchError;
use crate::ports;
use crate::subscriber::EventHandler;
use crate::types::{ChannelEvent, NotificationId, NotificationPayload};
use crate::view::ViewHandle;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct NotificationIds<C> {
    scheme: NotificationIdScheme,
    clock: C,
    counter: AtomicU32,
}

impl<C: ports::Clock> NotificationIds<C> {
    pub fn new(scheme: NotificationIdScheme, clock: C) -> Self {
        Self {
            scheme,
            clock,
            counter: AtomicU32::new(0),
        }
    }

    pub fn next(&self) -> NotificationId {
        match self.scheme {
            NotificationIdScheme::Uptime => NotificationId(self.clock.uptime().as_millis() as u32),
            NotificationIdScheme::Counter => {
                NotificationId(self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1))
            }
        }
    }
}

pub struct Notifier<S, C> {
    sink: S,
    ids: Arc<NotificationIds<C>>,
    view_url: Arc<str>,
}

impl<S: Clone, C> Clone for Notifier<S, C> {
    fn clone(&self) -> Self {
        Self {
            sink: self.sink.clone(),
            ids: Arc::clone(&self.ids),
            view_url: Arc::clone(&self.view_url),
        }
    }
}

impl<S, C> Notifier<S, C>
where
    S: ports::NotificationSink,
    C: ports::Clock,
{
    pub fn new(sink: S, ids: NotificationIds<C>, view_url: impl Into<Arc<str>>) -> Self {
        Self {
            sink,
            ids: Arc::new(ids),
            view_url: view_url.into(),
        }
    }

    /// Posts the notification on a separate task. A refused post is logged,
    /// never propagated.
    pub fn notify(&self) -> JoinHandle<Option<NotificationId>> {
        let sink = self.sink.clone();
        let id = self.ids.next();
        let payload = NotificationPayload::data_available(&self.view_url);
        tokio::spawn(async move {
            match sink.post(id, &payload).await {
                Ok(()) => {
                    debug!(id = id.0, "notification posted");
                    Some(id)
                }
                Err(err) => {
                    warn!(id = id.0, %err, "notification failed");
                    None
                }
            }
        })
    }
}

#[derive(Clone)]
pub struct Refresher<F> {
    fetcher: F,
    url: Arc<str>,
    timeout: Duration,
    view: ViewHandle,
}

impl<F: ports::TableFetcher> Refresher<F> {
    pub fn new(fetcher: F, url: impl Into<Arc<str>>, timeout: Duration, view: ViewHandle) -> Self {
        Self {
            fetcher,
            url: url.into(),
            timeout,
            view,
        }
    }

    pub fn view(&self) -> &ViewHandle {
        &self.view
    }

    /// Fetch-and-display on a separate task.
    pub fn refresh(&self) -> JoinHandle<Result<(), FetchError>> {
        let refresher = self.clone();
        tokio::spawn(async move { refresher.fetch_and_display().await })
    }

    /// Fetches the table and hands the outcome to the view task. On failure
    /// the view keeps its current table and records the error.
    pub async fn fetch_and_display(&self) -> Result<(), FetchError> {
        let ticket = self.view.ticket();
        let fetched = tokio::time::timeout(self.timeout, self.fetcher.fetch(&self.url))
            .await
            .unwrap_or(Err(FetchError::Timeout(self.timeout)));
        match fetched {
            Ok(html) => {
                debug!(bytes = html.len(), "table fetched");
                self.view.show(ticket, html).await;
                Ok(())
            }
            Err(err) => {
                warn!(%err, url = %self.url, "table refresh failed");
                self.view.show_error(ticket, err.clone()).await;
                Err(err)
            }
        }
    }
}

/// Join handles for the two independent halves of one event.
pub struct RefreshCycle {
    pub notification: JoinHandle<Option<NotificationId>>,
    pub refresh: JoinHandle<Result<(), FetchError>>,
}

pub struct DataAvailableHandler<S, C, F> {
    notifier: Notifier<S, C>,
    refresher: Refresher<F>,
}

impl<S, C, F> DataAvailableHandler<S, C, F>
where
    S: ports::NotificationSink,
    C: ports::Clock,
    F: ports::TableFetcher,
{
    pub fn new(notifier: Notifier<S, C>, refresher: Refresher<F>) -> Self {
        Self {
            notifier,
            refresher,
        }
    }

    /// Every call runs a full, independent notify and refresh cycle.
    pub fn on_data_available(&self) -> RefreshCycle {
        RefreshCycle {
            notification: self.notifier.notify(),
            refresh: self.refresher.refresh(),
        }
    }

    pub fn into_event_handler(self) -> EventHandler {
        Arc::new(move |event: &ChannelEvent| {
            match event.message() {
                Some(message) => info!(channel = %event.channel, text = %message, "data available"),
                None => info!(channel = %event.channel, "data available"),
            }
            let _ = self.on_data_available();
        })
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use crate::error::NotificationError;
    use crate::view::spawn_view;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone)]
    struct FixedClock(Duration);

    impl ports::Clock for FixedClock {
        fn uptime(&self) -> Duration {
            self.0
        }
    }

    #[derive(Clone, Default)]
    struct TestSink {
        posted: Arc<Mutex<Vec<(NotificationId, NotificationPayload)>>>,
        refuse: bool,
    }

    impl ports::NotificationSink for TestSink {
        type Fut<'a>
            = std::future::Ready<Result<(), NotificationError>>
        where
            Self: 'a;

        fn post<'a>(
            &'a self,
            id: NotificationId,
            payload: &'a NotificationPayload,
        ) -> Self::Fut<'a> {
            self.posted
                .lock()
                .expect("posted lock")
                .push((id, payload.clone()));
            if self.refuse {
                std::future::ready(Err(NotificationError("daemon unavailable".to_string())))
            } else {
                std::future::ready(Ok(()))
            }
        }
    }

    #[derive(Clone)]
    enum Response {
        Html(&'static str),
        Fail(FetchError),
        Hang,
    }

    #[derive(Clone)]
    struct TestFetcher {
        response: Response,
        calls: Arc<AtomicUsize>,
    }

    impl TestFetcher {
        fn new(response: Response) -> Self {
            Self {
                response,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ports::TableFetcher for TestFetcher {
        type Fut<'a>
            = Pin<Box<dyn Future<Output = Result<String, FetchError>> + Send + 'a>>
        where
            Self: 'a;

        fn fetch<'a>(&'a self, _url: &'a str) -> Self::Fut<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let response = self.response.clone();
            Box::pin(async move {
                match response {
                    Response::Html(html) => Ok(html.to_string()),
                    Response::Fail(err) => Err(err),
                    Response::Hang => std::future::pending().await,
                }
            })
        }
    }

    fn handler(
        sink: TestSink,
        fetcher: TestFetcher,
        view: ViewHandle,
    ) -> DataAvailableHandler<TestSink, FixedClock, TestFetcher> {
        let ids = NotificationIds::new(
            NotificationIdScheme::Counter,
            FixedClock(Duration::from_millis(5)),
        );
        DataAvailableHandler::new(
            Notifier::new(sink, ids, "http://127.0.0.1:3000"),
            Refresher::new(fetcher, "https://table.example/html", Duration::from_secs(5), view),
        )
    }

    #[test]
    fn next__should_collide_within_same_millisecond_for_uptime_scheme() {
        // Given
        let ids = NotificationIds::new(
            NotificationIdScheme::Uptime,
            FixedClock(Duration::from_millis(86_400_123)),
        );

        // When
        let first = ids.next();
        let second = ids.next();

        // Then
        assert_eq!(first, second);
        assert_eq!(first, NotificationId(86_400_123));
    }

    #[test]
    fn next__should_truncate_uptime_to_32_bits() {
        let ids = NotificationIds::new(
            NotificationIdScheme::Uptime,
            FixedClock(Duration::from_millis(u64::from(u32::MAX) + 11)),
        );

        assert_eq!(ids.next(), NotificationId(10));
    }

    #[test]
    fn next__should_be_distinct_for_counter_scheme_at_any_rate() {
        // Given
        let ids = NotificationIds::new(
            NotificationIdScheme::Counter,
            FixedClock(Duration::from_millis(5)),
        );

        // When
        let issued: std::collections::HashSet<NotificationId> =
            (0..1000).map(|_| ids.next()).collect();

        // Then
        assert_eq!(issued.len(), 1000);
    }

    #[tokio::test]
    async fn on_data_available__should_notify_and_refresh_once_per_event() {
        // Given
        let sink = TestSink::default();
        let fetcher = TestFetcher::new(Response::Html("<html><body>TEST</body></html>"));
        let (view, _task) = spawn_view();
        let handler = handler(sink.clone(), fetcher.clone(), view.clone());

        // When
        for _ in 0..2 {
            let cycle = handler.on_data_available();
            cycle.notification.await.expect("notification task");
            cycle
                .refresh
                .await
                .expect("refresh task")
                .expect("refresh");
        }

        // Then
        let posted = sink.posted.lock().expect("posted lock");
        assert_eq!(posted.len(), 2);
        assert_ne!(posted[0].0, posted[1].0);
        assert_eq!(posted[0].1, NotificationPayload::data_available("http://127.0.0.1:3000"));
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(
            view.snapshot().content.as_deref(),
            Some("<html><body>TEST</body></html>")
        );
    }

    #[tokio::test]
    async fn on_data_available__should_refresh_even_when_notification_fails() {
        // Given
        let sink = TestSink {
            refuse: true,
            ..TestSink::default()
        };
        let fetcher = TestFetcher::new(Response::Html("<table>today</table>"));
        let (view, _task) = spawn_view();
        let handler = handler(sink, fetcher, view.clone());

        // When
        let cycle = handler.on_data_available();
        let posted = cycle.notification.await.expect("notification task");
        let refreshed = cycle.refresh.await.expect("refresh task");

        // Then
        assert!(posted.is_none());
        assert_eq!(refreshed, Ok(()));
        assert_eq!(view.snapshot().content.as_deref(), Some("<table>today</table>"));
    }

    #[tokio::test]
    async fn fetch_and_display__should_keep_previous_table_on_failure() {
        // Given
        let (view, _task) = spawn_view();
        view.show(view.ticket(), "<table>yesterday</table>".to_string())
            .await;
        let failing = TestFetcher::new(Response::Fail(FetchError::Network(
            "connection refused".to_string(),
        )));
        let refresher = Refresher::new(
            failing,
            "https://table.example/html",
            Duration::from_secs(5),
            view.clone(),
        );

        // When
        let result = refresher.fetch_and_display().await;

        // Then
        let expected = FetchError::Network("connection refused".to_string());
        assert_eq!(result, Err(expected.clone()));
        let snapshot = view.snapshot();
        assert_eq!(snapshot.content.as_deref(), Some("<table>yesterday</table>"));
        assert_eq!(snapshot.last_error, Some(expected));
    }

    #[tokio::test]
    async fn fetch_and_display__should_time_out_hanging_fetch() {
        // Given
        let (view, _task) = spawn_view();
        let hanging = TestFetcher::new(Response::Hang);
        let timeout = Duration::from_millis(20);
        let refresher =
            Refresher::new(hanging, "https://table.example/html", timeout, view.clone());

        // When
        let result = refresher.fetch_and_display().await;

        // Then
        assert_eq!(result, Err(FetchError::Timeout(timeout)));
        assert!(view.snapshot().content.is_none());
    }

    #[tokio::test]
    async fn into_event_handler__should_run_cycle_per_event() {
        // Given
        let sink = TestSink::default();
        let fetcher = TestFetcher::new(Response::Html("<table/>"));
        let (view, _task) = spawn_view();
        let event_handler =
            handler(sink.clone(), fetcher.clone(), view.clone()).into_event_handler();
        let event = ChannelEvent::new("energized-atoll-189", "covid-data-available")
            .with_data(r#"{"message":"Today's COVID report data is available!"}"#);

        // When
        event_handler(&event);
        event_handler(&event);
        for _ in 0..50 {
            let posted = sink.posted.lock().expect("posted lock").len();
            if fetcher.calls() == 2 && posted == 2 && view.snapshot().content.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // Then
        assert_eq!(sink.posted.lock().expect("posted lock").len(), 2);
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(view.snapshot().content.as_deref(), Some("<table/>"));
    }
}
