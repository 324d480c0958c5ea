pub mod activation;
pub mod event;
pub mod notification;
pub mod subscription;

pub use activation::Activation;
pub use event::{ChannelEvent, TransportEvent};
pub use notification::{Importance, NotificationId, NotificationPayload};
pub use subscription::ChannelSubscription;
