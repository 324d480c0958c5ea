use tokio::sync::mpsc;

use crate::error::ConnectionError;
use crate::types::TransportEvent;

/// A live connection to a publish/subscribe service.
///
/// Channel messages are pushed into the sender handed to `connect`, in the
/// order the service delivers them. Dropping that sender, or sending
/// [`TransportEvent::Closed`], ends the stream.
pub trait PubSubTransport: Send + 'static {
    type Fut<'a>: Future<Output = Result<(), ConnectionError>> + Send + 'a
    where
        Self: 'a;

    fn connect<'a>(
        &'a mut self,
        app_key: &'a str,
        cluster: &'a str,
        events: mpsc::Sender<TransportEvent>,
    ) -> Self::Fut<'a>;

    fn subscribe<'a>(&'a mut self, channel: &'a str) -> Self::Fut<'a>;

    fn unsubscribe<'a>(&'a mut self, channel: &'a str) -> Self::Fut<'a>;

    fn disconnect<'a>(&'a mut self) -> Self::Fut<'a>;
}
