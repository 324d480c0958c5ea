pub mod fetch;
pub mod notify;
pub mod pubsub;
pub mod time;

pub use fetch::TableFetcher;
pub use notify::NotificationSink;
pub use pubsub::PubSubTransport;
pub use time::Clock;
