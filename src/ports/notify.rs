use crate::error::NotificationError;
use crate::types::{NotificationId, NotificationPayload};

pub trait NotificationSink: Clone + Send + Sync + 'static {
    type Fut<'a>: Future<Output = Result<(), NotificationError>> + Send + 'a
    where
        Self: 'a;

    fn post<'a>(&'a self, id: NotificationId, payload: &'a NotificationPayload) -> Self::Fut<'a>;
}
