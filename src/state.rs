use crate::notifier::Refresher;
use crate::service::ListenerStatus;
use crate::types::ChannelSubscription;
use crate::view::ActivationTracker;

use std::sync::Arc;
use tokio::sync::watch;

pub struct AppState<F> {
    pub refresher: Refresher<F>,
    pub activation: Arc<ActivationTracker>,
    pub listener: watch::Receiver<ListenerStatus>,
    pub subscription: Arc<ChannelSubscription>,
}

impl<F: Clone> Clone for AppState<F> {
    fn clone(&self) -> Self {
        Self {
            refresher: self.refresher.clone(),
            activation: Arc::clone(&self.activation),
            listener: self.listener.clone(),
            subscription: Arc::clone(&self.subscription),
        }
    }
}
