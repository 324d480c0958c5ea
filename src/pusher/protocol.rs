//! Pusher Channels wire protocol, version 7.

use crate::error::ConnectionError;
use crate::types::ChannelEvent;

use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

pub(crate) const PROTOCOL_VERSION: u8 = 7;
pub(crate) const DEFAULT_ACTIVITY_TIMEOUT: Duration = Duration::from_secs(120);

pub(crate) fn socket_url(app_key: &str, cluster: &str) -> String {
    format!(
        "wss://ws-{cluster}.pusher.com:443/app/{app_key}?protocol={PROTOCOL_VERSION}&client={}&version={}&flash=false",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Frame {
    ConnectionEstablished {
        socket_id: String,
        activity_timeout: Duration,
    },
    Error {
        code: Option<u16>,
        message: String,
    },
    Ping,
    Pong,
    SubscriptionSucceeded {
        channel: String,
    },
    Event(ChannelEvent),
    Other(String),
}

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

pub(crate) fn decode(text: &str) -> Result<Frame, serde_json::Error> {
    let raw: RawFrame = serde_json::from_str(text)?;
    let frame = match raw.event.as_str() {
        "pusher:connection_established" => {
            let data = data_object(raw.data.as_ref());
            let socket_id = data
                .as_ref()
                .and_then(|data| data.get("socket_id"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let activity_timeout = data
                .as_ref()
                .and_then(|data| data.get("activity_timeout"))
                .and_then(Value::as_u64)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_ACTIVITY_TIMEOUT);
            Frame::ConnectionEstablished {
                socket_id,
                activity_timeout,
            }
        }
        "pusher:error" => {
            let data = data_object(raw.data.as_ref());
            let code = data
                .as_ref()
                .and_then(|data| data.get("code"))
                .and_then(Value::as_u64)
                .and_then(|code| u16::try_from(code).ok());
            let message = data
                .as_ref()
                .and_then(|data| data.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            Frame::Error { code, message }
        }
        "pusher:ping" => Frame::Ping,
        "pusher:pong" => Frame::Pong,
        "pusher_internal:subscription_succeeded" => Frame::SubscriptionSucceeded {
            channel: raw.channel.unwrap_or_default(),
        },
        event => match raw.channel {
            Some(channel) if !event.starts_with("pusher") => Frame::Event(ChannelEvent {
                channel,
                event: event.to_string(),
                data: raw.data.map(|data| match data {
                    Value::String(text) => text,
                    other => other.to_string(),
                }),
            }),
            _ => Frame::Other(raw.event),
        },
    };
    Ok(frame)
}

/// Pusher double-encodes most payloads: `data` is a JSON string holding JSON.
fn data_object(data: Option<&Value>) -> Option<Value> {
    match data? {
        Value::String(text) => serde_json::from_str(text).ok(),
        other => Some(other.clone()),
    }
}

pub(crate) fn subscribe(channel: &str) -> String {
    json!({ "event": "pusher:subscribe", "data": { "channel": channel } }).to_string()
}

pub(crate) fn unsubscribe(channel: &str) -> String {
    json!({ "event": "pusher:unsubscribe", "data": { "channel": channel } }).to_string()
}

pub(crate) fn ping() -> String {
    json!({ "event": "pusher:ping", "data": {} }).to_string()
}

pub(crate) fn pong() -> String {
    json!({ "event": "pusher:pong", "data": {} }).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reconnect {
    Never,
    WithBackoff,
    Immediately,
}

/// 4000-4099 must not reconnect, 4100-4199 back off first, 4200-4299 may
/// reconnect straight away. Anything else is treated as a dropped socket.
pub(crate) fn classify(code: Option<u16>) -> Reconnect {
    match code {
        Some(4000..=4099) => Reconnect::Never,
        Some(4200..=4299) => Reconnect::Immediately,
        _ => Reconnect::WithBackoff,
    }
}

pub(crate) fn connection_error(code: Option<u16>, message: &str) -> ConnectionError {
    let detail = match code {
        Some(code) => format!("pusher error {code}: {message}"),
        None => format!("pusher error: {message}"),
    };
    match classify(code) {
        Reconnect::Never => ConnectionError::terminal(detail),
        Reconnect::WithBackoff | Reconnect::Immediately => ConnectionError::transient(detail),
    }
}
