//! Background listener service and the supervisor that restarts it whenever it
//! is torn down for anything other than shutdown.

use crate::backoff::{Backoff, ReconnectConfig};
use crate::error::ConnectionError;
use crate::ports::PubSubTransport;
use crate::subscriber::{EventHandler, EventSubscriber, SubscriberExit};
use crate::types::ChannelSubscription;

use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const RESTART_CAPACITY: usize = 8;

pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Resolves once shutdown was triggered or its trigger was dropped.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    pub async fn triggered(&mut self) {
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }
}

pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ListenerStatus {
    Starting,
    Connecting { attempt: u32 },
    Listening,
    Stopped { reason: String },
}

impl ListenerStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Listening)
    }
}

/// Broadcast by a listener service that was torn down and should be
/// restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartSignal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceExit {
    Shutdown,
    /// The transport went away; a restart signal was emitted.
    TornDown(ConnectionError),
    /// The server refused us; restarting would not help.
    Terminal(ConnectionError),
}

pub struct ListenerService<T> {
    subscriber: EventSubscriber<T>,
    subscription: ChannelSubscription,
    handler: EventHandler,
    reconnect: ReconnectConfig,
    status: watch::Sender<ListenerStatus>,
    restart: broadcast::Sender<RestartSignal>,
}

impl<T: PubSubTransport> ListenerService<T> {
    pub fn new(
        transport: T,
        subscription: ChannelSubscription,
        handler: EventHandler,
        reconnect: ReconnectConfig,
        status: watch::Sender<ListenerStatus>,
        restart: broadcast::Sender<RestartSignal>,
    ) -> Self {
        Self {
            subscriber: EventSubscriber::new(transport),
            subscription,
            handler,
            reconnect,
            status,
            restart,
        }
    }

    pub async fn run(mut self, mut shutdown: ShutdownSignal) -> ServiceExit {
        let exit = match self.listen(&mut shutdown).await {
            Ok(SubscriberExit::Shutdown) => ServiceExit::Shutdown,
            Ok(SubscriberExit::TransportClosed(err)) | Err(err) if err.is_transient() => {
                ServiceExit::TornDown(err)
            }
            Ok(SubscriberExit::TransportClosed(err)) | Err(err) => ServiceExit::Terminal(err),
        };
        self.teardown(&exit).await;
        exit
    }

    async fn listen(
        &mut self,
        shutdown: &mut ShutdownSignal,
    ) -> Result<SubscriberExit, ConnectionError> {
        let ChannelSubscription {
            app_key,
            cluster,
            channel,
            event,
        } = self.subscription.clone();

        let handle = self.subscriber.subscribe(&channel).await?;
        self.subscriber.bind(&handle, &event, self.handler.clone());

        let mut backoff = Backoff::new(self.reconnect);
        loop {
            if shutdown.is_triggered() {
                return Ok(SubscriberExit::Shutdown);
            }
            self.status.send_replace(ListenerStatus::Connecting {
                attempt: backoff.attempts() + 1,
            });
            let connected = tokio::select! {
                connected = self.subscriber.connect(&app_key, &cluster) => connected,
                _ = shutdown.triggered() => return Ok(SubscriberExit::Shutdown),
            };
            match connected {
                Ok(()) => break,
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) => {
                    let delay = backoff.next_delay();
                    warn!(%err, attempt = backoff.attempts(), ?delay, "connect failed; retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.triggered() => return Ok(SubscriberExit::Shutdown),
                    }
                }
            }
        }

        self.status.send_replace(ListenerStatus::Listening);
        info!(channel = %channel, event = %event, "listening");
        Ok(self.subscriber.run_until(shutdown.triggered()).await)
    }

    async fn teardown(&mut self, exit: &ServiceExit) {
        self.subscriber.unsubscribe(&self.subscription.channel).await;
        self.subscriber.disconnect().await;

        let reason = match exit {
            ServiceExit::Shutdown => "shutdown".to_string(),
            ServiceExit::TornDown(err) | ServiceExit::Terminal(err) => err.to_string(),
        };
        self.status.send_replace(ListenerStatus::Stopped { reason });

        match exit {
            ServiceExit::TornDown(err) => {
                warn!(%err, "listener torn down; requesting restart");
                // No receivers just means nobody restarts us.
                let _ = self.restart.send(RestartSignal);
            }
            ServiceExit::Terminal(err) => error!(%err, "listener stopped"),
            ServiceExit::Shutdown => info!("listener stopped"),
        }
    }
}

/// Restarts the listener service with the same subscription every time it
/// broadcasts a [`RestartSignal`]. Restarts are immediate.
pub struct Supervisor<M> {
    make_transport: M,
    subscription: ChannelSubscription,
    handler: EventHandler,
    reconnect: ReconnectConfig,
    status: watch::Sender<ListenerStatus>,
    restart: broadcast::Sender<RestartSignal>,
}

impl<M, T> Supervisor<M>
where
    M: Fn() -> T,
    T: PubSubTransport,
{
    pub fn new(
        make_transport: M,
        subscription: ChannelSubscription,
        handler: EventHandler,
        reconnect: ReconnectConfig,
    ) -> Self {
        let (status, _) = watch::channel(ListenerStatus::Starting);
        let (restart, _) = broadcast::channel(RESTART_CAPACITY);
        Self {
            make_transport,
            subscription,
            handler,
            reconnect,
            status,
            restart,
        }
    }

    pub fn status(&self) -> watch::Receiver<ListenerStatus> {
        self.status.subscribe()
    }

    pub fn restart_signals(&self) -> broadcast::Receiver<RestartSignal> {
        self.restart.subscribe()
    }

    /// Runs until a service ends in shutdown or a terminal error.
    pub async fn run(self, shutdown: ShutdownSignal) -> ServiceExit {
        let mut restarts = self.restart.subscribe();
        let mut generation = 1u64;
        let mut service = self.spawn(generation, &shutdown);

        loop {
            tokio::select! {
                // A torn down service signals before it returns.
                biased;
                signal = restarts.recv() => {
                    match signal {
                        Ok(RestartSignal) => {}
                        Err(RecvError::Lagged(skipped)) => warn!(skipped, "restart signals lagged"),
                        Err(RecvError::Closed) => return ServiceExit::Shutdown,
                    }
                    let _ = (&mut service).await;
                    if shutdown.is_triggered() {
                        return ServiceExit::Shutdown;
                    }
                    generation += 1;
                    info!(generation, "restarting listener service");
                    service = self.spawn(generation, &shutdown);
                }
                joined = &mut service => match joined {
                    Ok(exit) => return exit,
                    Err(err) => {
                        error!(%err, "listener service panicked");
                        if shutdown.is_triggered() {
                            return ServiceExit::Shutdown;
                        }
                        generation += 1;
                        service = self.spawn(generation, &shutdown);
                    }
                },
            }
        }
    }

    fn spawn(&self, generation: u64, shutdown: &ShutdownSignal) -> JoinHandle<ServiceExit> {
        info!(generation, channel = %self.subscription.channel, "starting listener service");
        let service = ListenerService::new(
            (self.make_transport)(),
            self.subscription.clone(),
            self.handler.clone(),
            self.reconnect,
            self.status.clone(),
            self.restart.clone(),
        );
        tokio::spawn(service.run(shutdown.clone()))
    }
}
