use crate::error::ConnectionError;

/// One message published on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEvent {
    pub channel: String,
    pub event: String,
    pub data: Option<String>,
}

impl ChannelEvent {
    pub fn new(channel: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            event: event.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Protocol-level events never reach application handlers.
    pub fn is_control(&self) -> bool {
        self.event.starts_with("pusher:") || self.event.starts_with("pusher_internal:")
    }

    /// The `message` field of a JSON payload, if the publisher sent one.
    pub fn message(&self) -> Option<String> {
        let data = self.data.as_deref()?;
        let value: serde_json::Value = serde_json::from_str(data).ok()?;
        value
            .get("message")
            .and_then(|message| message.as_str())
            .map(str::to_string)
    }
}

/// What a transport hands to its subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Message(ChannelEvent),
    /// The transport gave up; no further events follow.
    Closed(ConnectionError),
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;

    #[test]
    fn message__should_extract_publisher_message() {
        // Given
        let event = ChannelEvent::new("energized-atoll-189", "covid-data-available")
            .with_data(r#"{"message":"Today's COVID report data is available!"}"#);

        // Then
        assert_eq!(
            event.message().as_deref(),
            Some("Today's COVID report data is available!")
        );
    }

    #[test]
    fn message__should_ignore_non_json_payload() {
        let event = ChannelEvent::new("c", "e").with_data("plain text");

        assert!(event.message().is_none());
    }

    #[test]
    fn is_control__should_flag_pusher_events() {
        assert!(ChannelEvent::new("c", "pusher:ping").is_control());
        assert!(ChannelEvent::new("c", "pusher_internal:subscription_succeeded").is_control());
        assert!(!ChannelEvent::new("c", "covid-data-available").is_control());
    }
}
