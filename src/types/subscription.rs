/// Fixed descriptor for the one channel/event pair the listener follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSubscription {
    pub app_key: String,
    pub cluster: String,
    pub channel: String,
    pub event: String,
}
