//! Error types for the listener, the table fetch and the notification path.

use std::time::Duration;

use thiserror::Error;

/// Failure to open or keep the pub/sub connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Network unreachable, handshake failure or a server asking us to retry.
    #[error("transient connection failure: {0}")]
    Transient(String),

    /// Rejected credentials, disabled app or anything else a retry cannot fix.
    #[error("terminal connection failure: {0}")]
    Terminal(String),
}

impl ConnectionError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn terminal(msg: impl Into<String>) -> Self {
        Self::Terminal(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Failure to fetch the HTML table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("table fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("table server answered with status {0}")]
    Status(u16),

    #[error("network error: {0}")]
    Network(String),

    #[error("could not read table body: {0}")]
    Body(String),
}

/// The desktop notification service declined to post.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("notification was not posted: {0}")]
pub struct NotificationError(pub String);

/// Invalid static configuration, detected once at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid app key '{0}': expected a non-empty alphanumeric key")]
    AppKey(String),

    #[error("invalid cluster '{0}': expected lowercase letters, digits or '-'")]
    Cluster(String),

    #[error("invalid channel name '{0}'")]
    Channel(String),

    #[error("event name cannot be empty")]
    EmptyEvent,

    #[error("invalid table url '{0}': expected an absolute http(s) url")]
    TableUrl(String),

    #[error("invalid date '{0}': expected DD-MM-YYYY")]
    Date(String),

    #[error("fetch timeout must be greater than 0")]
    Timeout,

    #[error("failed to load config file {path}: {reason}")]
    File { path: String, reason: String },
}

/// Failure to bring the view server up or keep it running.
#[derive(Error, Debug)]
pub enum ServeError {
    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },

    #[error("view server failed: {0}")]
    Server(std::io::Error),
}
