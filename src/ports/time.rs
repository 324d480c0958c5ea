use std::time::Duration;

pub trait Clock: Clone + Send + Sync + 'static {
    /// Time elapsed since the clock started, monotonic.
    fn uptime(&self) -> Duration;
}
