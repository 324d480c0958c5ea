//! Test doubles shared by the subscriber and service tests.

use crate::error::ConnectionError;
use crate::ports::PubSubTransport;
use crate::types::TransportEvent;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TransportCall {
    Connect { app_key: String, cluster: String },
    Subscribe(String),
    Unsubscribe(String),
    Disconnect,
}

#[derive(Clone, Default)]
pub(crate) struct TransportLog {
    calls: Arc<Mutex<Vec<TransportCall>>>,
    events: Arc<Mutex<Option<mpsc::Sender<TransportEvent>>>>,
}

impl TransportLog {
    pub(crate) fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Sender the subscriber handed over on the last successful connect.
    pub(crate) fn events(&self) -> mpsc::Sender<TransportEvent> {
        self.events
            .lock()
            .expect("events lock")
            .clone()
            .expect("transport connected")
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().expect("calls lock").push(call);
    }
}

#[derive(Default)]
pub(crate) struct FakeTransport {
    pub(crate) log: TransportLog,
    connect_results: VecDeque<Result<(), ConnectionError>>,
    close_after_connect: Option<ConnectionError>,
    subscribe_error: Option<ConnectionError>,
}

impl FakeTransport {
    pub(crate) fn new(log: TransportLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    /// Results returned by successive `connect` calls; `Ok` once exhausted.
    pub(crate) fn with_connect_results(
        mut self,
        results: impl IntoIterator<Item = Result<(), ConnectionError>>,
    ) -> Self {
        self.connect_results = results.into_iter().collect();
        self
    }

    /// Every `subscribe` fails with `err`.
    pub(crate) fn failing_subscribe(mut self, err: ConnectionError) -> Self {
        self.subscribe_error = Some(err);
        self
    }

    /// Queue a `Closed` event right after connecting.
    pub(crate) fn closing_with(mut self, err: ConnectionError) -> Self {
        self.close_after_connect = Some(err);
        self
    }
}

impl PubSubTransport for FakeTransport {
    type Fut<'a>
        = std::future::Ready<Result<(), ConnectionError>>
    where
        Self: 'a;

    fn connect<'a>(
        &'a mut self,
        app_key: &'a str,
        cluster: &'a str,
        events: mpsc::Sender<TransportEvent>,
    ) -> Self::Fut<'a> {
        self.log.record(TransportCall::Connect {
            app_key: app_key.to_string(),
            cluster: cluster.to_string(),
        });
        let result = self.connect_results.pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            if let Some(err) = self.close_after_connect.clone() {
                events
                    .try_send(TransportEvent::Closed(err))
                    .expect("queue close");
            }
            *self.log.events.lock().expect("events lock") = Some(events);
        }
        std::future::ready(result)
    }

    fn subscribe<'a>(&'a mut self, channel: &'a str) -> Self::Fut<'a> {
        self.log.record(TransportCall::Subscribe(channel.to_string()));
        std::future::ready(match self.subscribe_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        })
    }

    fn unsubscribe<'a>(&'a mut self, channel: &'a str) -> Self::Fut<'a> {
        self.log
            .record(TransportCall::Unsubscribe(channel.to_string()));
        std::future::ready(Ok(()))
    }

    fn disconnect<'a>(&'a mut self) -> Self::Fut<'a> {
        self.log.record(TransportCall::Disconnect);
        std::future::ready(Ok(()))
    }
}
