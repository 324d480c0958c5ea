//! Pusher Channels client over a websocket.

mod connection;
pub(crate) mod protocol;

use crate::backoff::ReconnectConfig;
use crate::error::ConnectionError;
use crate::ports::PubSubTransport;
use crate::types::TransportEvent;

use connection::Command;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

const COMMAND_CAPACITY: usize = 32;

/// [`PubSubTransport`] backed by one Pusher websocket. Reconnection after the
/// first successful connect is handled internally.
#[derive(Default)]
pub struct PusherTransport {
    reconnect: ReconnectConfig,
    commands: Option<mpsc::Sender<Command>>,
    task: Option<JoinHandle<()>>,
}

impl PusherTransport {
    pub fn new(reconnect: ReconnectConfig) -> Self {
        Self {
            reconnect,
            commands: None,
            task: None,
        }
    }

    /// True while the connection task is running and reading commands.
    fn is_live(&self) -> bool {
        self.commands
            .as_ref()
            .is_some_and(|commands| !commands.is_closed())
            && self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    async fn send(&self, command: Command) -> Result<(), ConnectionError> {
        let Some(commands) = self.commands.as_ref() else {
            return Err(ConnectionError::transient("not connected"));
        };
        commands
            .send(command)
            .await
            .map_err(|_| ConnectionError::transient("connection task stopped"))
    }
}

impl PubSubTransport for PusherTransport {
    type Fut<'a>
        = Pin<Box<dyn Future<Output = Result<(), ConnectionError>> + Send + 'a>>
    where
        Self: 'a;

    fn connect<'a>(
        &'a mut self,
        app_key: &'a str,
        cluster: &'a str,
        events: mpsc::Sender<TransportEvent>,
    ) -> Self::Fut<'a> {
        Box::pin(async move {
            if self.is_live() {
                return Ok(());
            }
            // A task that gave up (e.g. terminal close) leaves stale handles.
            self.commands = None;
            if let Some(task) = self.task.take() {
                task.abort();
            }
            let url = protocol::socket_url(app_key, cluster);
            debug!(url = %url, "connecting to pusher");
            let session = connection::open(&url).await?;
            let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
            let task = tokio::spawn(connection::run(
                url,
                session,
                commands_rx,
                events,
                self.reconnect,
            ));
            self.commands = Some(commands_tx);
            self.task = Some(task);
            Ok(())
        })
    }

    fn subscribe<'a>(&'a mut self, channel: &'a str) -> Self::Fut<'a> {
        Box::pin(async move { self.send(Command::Subscribe(channel.to_string())).await })
    }

    fn unsubscribe<'a>(&'a mut self, channel: &'a str) -> Self::Fut<'a> {
        Box::pin(async move { self.send(Command::Unsubscribe(channel.to_string())).await })
    }

    fn disconnect<'a>(&'a mut self) -> Self::Fut<'a> {
        Box::pin(async move {
            if let Some(commands) = self.commands.take() {
                let _ = commands.send(Command::Shutdown).await;
            }
            if let Some(task) = self.task.take() {
                let _ = task.await;
            }
            Ok(())
        })
    }
}

impl Drop for PusherTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;

    async fn finished_task() -> JoinHandle<()> {
        let task = tokio::spawn(async {});
        while !task.is_finished() {
            tokio::task::yield_now().await;
        }
        task
    }

    #[tokio::test]
    async fn is_live__should_be_false_once_connection_task_stopped() {
        // Given
        let (commands, receiver) = mpsc::channel(COMMAND_CAPACITY);
        drop(receiver);
        let transport = PusherTransport {
            reconnect: ReconnectConfig::default(),
            commands: Some(commands),
            task: Some(finished_task().await),
        };

        // Then
        assert!(!transport.is_live());
    }

    #[tokio::test]
    async fn is_live__should_be_true_while_task_reads_commands() {
        // Given
        let (commands, mut receiver) = mpsc::channel(COMMAND_CAPACITY);
        let task = tokio::spawn(async move { while receiver.recv().await.is_some() {} });
        let transport = PusherTransport {
            reconnect: ReconnectConfig::default(),
            commands: Some(commands),
            task: Some(task),
        };

        // Then
        assert!(transport.is_live());
    }

    #[tokio::test]
    async fn subscribe__should_fail_when_connection_task_stopped() {
        // Given
        let (commands, receiver) = mpsc::channel(COMMAND_CAPACITY);
        drop(receiver);
        let mut transport = PusherTransport {
            reconnect: ReconnectConfig::default(),
            commands: Some(commands),
            task: Some(finished_task().await),
        };

        // When
        let result = transport.subscribe("energized-atoll-189").await;

        // Then
        assert_eq!(
            result,
            Err(ConnectionError::transient("connection task stopped"))
        );
        assert!(!transport.is_live());
    }

    #[tokio::test]
    async fn disconnect__should_clear_stopped_connection() {
        let (commands, receiver) = mpsc::channel(COMMAND_CAPACITY);
        drop(receiver);
        let mut transport = PusherTransport {
            reconnect: ReconnectConfig::default(),
            commands: Some(commands),
            task: Some(finished_task().await),
        };

        transport.disconnect().await.expect("disconnect");

        assert!(transport.commands.is_none());
        assert!(transport.task.is_none());
    }
}
