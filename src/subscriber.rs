//! Event subscriber: one pub/sub connection, named channels, one handler per
//! channel/event pair.

use crate::error::ConnectionError;
use crate::ports::PubSubTransport;
use crate::types::{ChannelEvent, TransportEvent};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const INBOX_CAPACITY: usize = 64;

/// Callback invoked for every matching event, on the subscriber's task.
pub type EventHandler = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

/// Handle returned by [`EventSubscriber::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    channel: String,
}

impl SubscriptionHandle {
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriberExit {
    Shutdown,
    TransportClosed(ConnectionError),
}

pub struct EventSubscriber<T> {
    transport: T,
    inbox: Option<mpsc::Receiver<TransportEvent>>,
    channels: HashSet<String>,
    handlers: HashMap<(String, String), EventHandler>,
}

impl<T: PubSubTransport> EventSubscriber<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            inbox: None,
            channels: HashSet::new(),
            handlers: HashMap::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inbox.is_some()
    }

    /// Opens the connection and sends any subscriptions made beforehand.
    /// Connecting an already connected subscriber does nothing.
    pub async fn connect(&mut self, app_key: &str, cluster: &str) -> Result<(), ConnectionError> {
        if self.is_connected() {
            debug!("already connected; ignoring connect");
            return Ok(());
        }
        let (events_tx, mut events_rx) = mpsc::channel(INBOX_CAPACITY);
        self.transport.connect(app_key, cluster, events_tx).await?;
        if let Err(err) = self.replay_subscriptions().await {
            if let Err(disconnect_err) = self.transport.disconnect().await {
                warn!(%disconnect_err, "disconnect after failed replay failed");
            }
            // A transport that closed right after connecting says why.
            return Err(closed_reason(&mut events_rx).unwrap_or(err));
        }
        self.inbox = Some(events_rx);
        info!(cluster, "pub/sub connection open");
        Ok(())
    }

    async fn replay_subscriptions(&mut self) -> Result<(), ConnectionError> {
        for channel in &self.channels {
            self.transport.subscribe(channel).await?;
        }
        Ok(())
    }

    /// Subscribing to a channel twice returns the existing subscription.
    pub async fn subscribe(
        &mut self,
        channel: &str,
    ) -> Result<SubscriptionHandle, ConnectionError> {
        let handle = SubscriptionHandle {
            channel: channel.to_string(),
        };
        if !self.channels.insert(channel.to_string()) {
            return Ok(handle);
        }
        if self.is_connected()
            && let Err(err) = self.transport.subscribe(channel).await
        {
            self.channels.remove(channel);
            return Err(err);
        }
        debug!(channel, "subscribed");
        Ok(handle)
    }

    /// Registers `handler` for `event` on the subscription's channel,
    /// replacing any handler bound earlier.
    pub fn bind(&mut self, subscription: &SubscriptionHandle, event: &str, handler: EventHandler) {
        let previous = self
            .handlers
            .insert((subscription.channel.clone(), event.to_string()), handler);
        if previous.is_some() {
            debug!(channel = %subscription.channel, event, "replaced event handler");
        }
    }

    /// Drops the channel and its handlers. Unknown channels are ignored.
    pub async fn unsubscribe(&mut self, channel: &str) {
        if !self.channels.remove(channel) {
            return;
        }
        self.handlers.retain(|(bound, _), _| bound != channel);
        if self.is_connected()
            && let Err(err) = self.transport.unsubscribe(channel).await
        {
            warn!(channel, %err, "unsubscribe failed");
        }
    }

    /// Closes the connection. Does nothing when never connected.
    pub async fn disconnect(&mut self) {
        if self.inbox.take().is_none() {
            return;
        }
        if let Err(err) = self.transport.disconnect().await {
            warn!(%err, "disconnect failed");
        }
        info!("pub/sub connection closed");
    }

    /// Invokes the handler bound to the event's channel/event pair, if any.
    pub fn dispatch(&self, event: &ChannelEvent) -> bool {
        dispatch(&self.channels, &self.handlers, event)
    }

    /// Delivers events in transport order until `shutdown` resolves or the
    /// transport closes. The subscriber counts as connected until
    /// [`disconnect`](Self::disconnect) either way.
    pub async fn run_until<F>(&mut self, shutdown: F) -> SubscriberExit
    where
        F: Future<Output = ()>,
    {
        let Some(mut inbox) = self.inbox.take() else {
            return SubscriberExit::TransportClosed(ConnectionError::transient("not connected"));
        };
        tokio::pin!(shutdown);

        let exit = loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break SubscriberExit::Shutdown,
                received = inbox.recv() => match received {
                    Some(TransportEvent::Message(event)) => {
                        if !dispatch(&self.channels, &self.handlers, &event) {
                            debug!(channel = %event.channel, event = %event.event, "ignored event");
                        }
                    }
                    Some(TransportEvent::Closed(err)) => break SubscriberExit::TransportClosed(err),
                    None => {
                        break SubscriberExit::TransportClosed(ConnectionError::transient(
                            "transport stopped",
                        ));
                    }
                }
            }
        };
        self.inbox = Some(inbox);
        exit
    }
}

fn closed_reason(inbox: &mut mpsc::Receiver<TransportEvent>) -> Option<ConnectionError> {
    while let Ok(event) = inbox.try_recv() {
        if let TransportEvent::Closed(err) = event {
            return Some(err);
        }
    }
    None
}

fn dispatch(
    channels: &HashSet<String>,
    handlers: &HashMap<(String, String), EventHandler>,
    event: &ChannelEvent,
) -> bool {
    if event.is_control() || !channels.contains(&event.channel) {
        return false;
    }
    match handlers.get(&(event.channel.clone(), event.event.clone())) {
        Some(handler) => {
            handler(event);
            true
        }
        None => false,
    }
}
