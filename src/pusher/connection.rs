use crate::backoff::{Backoff, ReconnectConfig};
use crate::error::ConnectionError;
use crate::pusher::protocol::{self, Frame, Reconnect};
use crate::types::TransportEvent;

use futures::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);
const PONG_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub(super) enum Command {
    Subscribe(String),
    Unsubscribe(String),
    Shutdown,
}

pub(super) struct Session {
    stream: WsStream,
    socket_id: String,
    activity_timeout: Duration,
}

enum Outcome {
    Shutdown,
    ConsumerGone,
    Dropped(Reconnect),
    Closed(ConnectionError),
}

/// Opens the socket and waits for `pusher:connection_established`. Both
/// steps together are bounded by the handshake timeout.
pub(super) async fn open(url: &str) -> Result<Session, ConnectionError> {
    tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake(url))
        .await
        .map_err(|_| ConnectionError::transient("timed out opening the pusher connection"))?
}

async fn handshake(url: &str) -> Result<Session, ConnectionError> {
    let (mut stream, _) = connect_async(url)
        .await
        .map_err(|err| ConnectionError::transient(format!("websocket connect failed: {err}")))?;

    let (socket_id, activity_timeout) = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match protocol::decode(text.as_str()) {
                Ok(Frame::ConnectionEstablished {
                    socket_id,
                    activity_timeout,
                }) => break (socket_id, activity_timeout),
                Ok(Frame::Error { code, message }) => {
                    return Err(protocol::connection_error(code, &message));
                }
                Ok(other) => trace!(?other, "frame before connection established"),
                Err(err) => warn!(%err, "undecodable frame during handshake"),
            },
            Some(Ok(Message::Close(frame))) => {
                let code = frame.as_ref().map(|frame| u16::from(frame.code));
                let reason = frame
                    .as_ref()
                    .map(|frame| frame.reason.as_str().to_string())
                    .unwrap_or_else(|| "closed during handshake".to_string());
                return Err(protocol::connection_error(code, &reason));
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                return Err(ConnectionError::transient(format!(
                    "websocket error during handshake: {err}"
                )));
            }
            None => {
                return Err(ConnectionError::transient("socket closed during handshake"));
            }
        }
    };

    Ok(Session {
        stream,
        socket_id,
        activity_timeout,
    })
}

/// Owns the socket for the lifetime of the transport, reconnecting on drops
/// and replaying channel subscriptions on every new socket.
pub(super) async fn run(
    url: String,
    session: Session,
    mut commands: mpsc::Receiver<Command>,
    events: mpsc::Sender<TransportEvent>,
    reconnect: ReconnectConfig,
) {
    let mut channels: HashSet<String> = HashSet::new();
    let mut pending = Some(session);
    let mut backoff = Backoff::new(reconnect);

    loop {
        let session = match pending.take() {
            Some(session) => session,
            None => match open_or_command(&url, &mut commands, &mut channels).await {
                None => return,
                Some(Ok(session)) => {
                    backoff.reset();
                    session
                }
                Some(Err(err)) if !err.is_transient() => {
                    error!(%err, "pusher refused reconnection");
                    let _ = events.send(TransportEvent::Closed(err)).await;
                    return;
                }
                Some(Err(err)) => {
                    let delay = backoff.next_delay();
                    warn!(%err, attempt = backoff.attempts(), ?delay, "reconnect failed");
                    if !wait(delay, &mut commands, &mut channels).await {
                        return;
                    }
                    continue;
                }
            },
        };

        match drive(session, &mut channels, &mut commands, &events).await {
            Outcome::Shutdown | Outcome::ConsumerGone => return,
            Outcome::Closed(err) => {
                error!(%err, "pusher closed the connection for good");
                let _ = events.send(TransportEvent::Closed(err)).await;
                return;
            }
            Outcome::Dropped(Reconnect::Immediately) => {
                info!("reconnecting to pusher");
            }
            Outcome::Dropped(_) => {
                let delay = backoff.next_delay();
                info!(?delay, "reconnecting to pusher after delay");
                if !wait(delay, &mut commands, &mut channels).await {
                    return;
                }
            }
        }
    }
}

/// Reopens the socket while still tracking subscription changes. `None`
/// means shutdown was requested before the socket opened.
async fn open_or_command(
    url: &str,
    commands: &mut mpsc::Receiver<Command>,
    channels: &mut HashSet<String>,
) -> Option<Result<Session, ConnectionError>> {
    let opening = open(url);
    tokio::pin!(opening);
    loop {
        tokio::select! {
            opened = &mut opening => return Some(opened),
            command = commands.recv() => {
                if !track(command, channels) {
                    return None;
                }
            }
        }
    }
}

/// Sleeps for `delay` while still tracking subscription changes. Returns
/// false when shutdown was requested.
async fn wait(
    delay: Duration,
    commands: &mut mpsc::Receiver<Command>,
    channels: &mut HashSet<String>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            command = commands.recv() => {
                if !track(command, channels) {
                    return false;
                }
            }
        }
    }
}

/// Applies a command received while no socket is open. Returns false on
/// shutdown.
fn track(command: Option<Command>, channels: &mut HashSet<String>) -> bool {
    match command {
        Some(Command::Subscribe(channel)) => {
            channels.insert(channel);
            true
        }
        Some(Command::Unsubscribe(channel)) => {
            channels.remove(&channel);
            true
        }
        Some(Command::Shutdown) | None => false,
    }
}

async fn drive(
    session: Session,
    channels: &mut HashSet<String>,
    commands: &mut mpsc::Receiver<Command>,
    events: &mpsc::Sender<TransportEvent>,
) -> Outcome {
    let Session {
        mut stream,
        socket_id,
        activity_timeout,
    } = session;
    info!(socket_id = %socket_id, "connected to pusher");

    for channel in channels.iter() {
        if let Err(err) = stream.send(Message::text(protocol::subscribe(channel))).await {
            warn!(channel = %channel, %err, "failed to replay subscription");
            return Outcome::Dropped(Reconnect::WithBackoff);
        }
    }

    let mut last_activity = Instant::now();
    let mut ping_sent_at: Option<Instant> = None;

    loop {
        let deadline = match ping_sent_at {
            Some(sent) => sent + PONG_TIMEOUT,
            None => last_activity + activity_timeout,
        };

        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                if ping_sent_at.is_some() {
                    warn!("no pong from pusher; dropping connection");
                    return Outcome::Dropped(Reconnect::Immediately);
                }
                if let Err(err) = stream.send(Message::text(protocol::ping())).await {
                    warn!(%err, "failed to send ping");
                    return Outcome::Dropped(Reconnect::WithBackoff);
                }
                trace!("sent ping");
                ping_sent_at = Some(Instant::now());
            }

            command = commands.recv() => {
                let frame = match command {
                    Some(Command::Subscribe(channel)) => {
                        let frame = protocol::subscribe(&channel);
                        channels.insert(channel);
                        frame
                    }
                    Some(Command::Unsubscribe(channel)) => {
                        let frame = protocol::unsubscribe(&channel);
                        channels.remove(&channel);
                        frame
                    }
                    Some(Command::Shutdown) | None => {
                        let _ = stream.close(None).await;
                        return Outcome::Shutdown;
                    }
                };
                if let Err(err) = stream.send(Message::text(frame)).await {
                    warn!(%err, "failed to send frame");
                    return Outcome::Dropped(Reconnect::WithBackoff);
                }
            }

            received = stream.next() => {
                last_activity = Instant::now();
                ping_sent_at = None;
                match received {
                    Some(Ok(Message::Text(text))) => match protocol::decode(text.as_str()) {
                        Ok(Frame::Event(event)) => {
                            if events.send(TransportEvent::Message(event)).await.is_err() {
                                return Outcome::ConsumerGone;
                            }
                        }
                        Ok(Frame::Ping) => {
                            if let Err(err) = stream.send(Message::text(protocol::pong())).await {
                                warn!(%err, "failed to answer ping");
                                return Outcome::Dropped(Reconnect::WithBackoff);
                            }
                        }
                        Ok(Frame::Error { code: code @ Some(4000..=4299), message }) => {
                            return match protocol::classify(code) {
                                Reconnect::Never => {
                                    Outcome::Closed(protocol::connection_error(code, &message))
                                }
                                reconnect => {
                                    warn!(?code, reason = %message, "pusher asked us to reconnect");
                                    Outcome::Dropped(reconnect)
                                }
                            };
                        }
                        Ok(Frame::Error { code, message }) => {
                            warn!(?code, reason = %message, "pusher reported an error");
                        }
                        Ok(Frame::SubscriptionSucceeded { channel }) => {
                            debug!(channel = %channel, "subscription acknowledged");
                        }
                        Ok(frame) => trace!(?frame, "ignored frame"),
                        Err(err) => warn!(%err, "undecodable frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.as_ref().map(|frame| u16::from(frame.code));
                        let reason = frame
                            .as_ref()
                            .map(|frame| frame.reason.as_str().to_string())
                            .unwrap_or_default();
                        return match protocol::classify(code) {
                            Reconnect::Never => {
                                Outcome::Closed(protocol::connection_error(code, &reason))
                            }
                            reconnect => {
                                warn!(?code, reason = %reason, "pusher closed the socket");
                                Outcome::Dropped(reconnect)
                            }
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(%err, "websocket error");
                        return Outcome::Dropped(Reconnect::WithBackoff);
                    }
                    None => {
                        warn!("websocket stream ended");
                        return Outcome::Dropped(Reconnect::WithBackoff);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_or_command__should_stop_on_shutdown_while_socket_hangs() {
        // Given
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let url = format!("ws://{}/app/key", listener.local_addr().expect("addr"));
        let (commands_tx, mut commands) = mpsc::channel(4);
        commands_tx
            .send(Command::Subscribe("energized-atoll-189".to_string()))
            .await
            .expect("send subscribe");
        commands_tx
            .send(Command::Shutdown)
            .await
            .expect("send shutdown");
        let mut channels = HashSet::new();

        // When
        let opened = tokio::time::timeout(
            Duration::from_secs(2),
            open_or_command(&url, &mut commands, &mut channels),
        )
        .await
        .expect("returned before the handshake timeout");

        // Then
        assert!(opened.is_none());
        assert!(channels.contains("energized-atoll-189"));
    }

    #[test]
    fn track__should_follow_subscriptions_until_shutdown() {
        let mut channels = HashSet::new();

        assert!(track(Some(Command::Subscribe("a".to_string())), &mut channels));
        assert!(track(Some(Command::Unsubscribe("a".to_string())), &mut channels));
        assert!(channels.is_empty());
        assert!(!track(Some(Command::Shutdown), &mut channels));
        assert!(!track(None, &mut channels));
    }
}
