use crate::types::activation::Activation;

pub const DATA_AVAILABLE_TITLE: &str = "Tabela diária com dados da COVID-19 disponível";
pub const DATA_AVAILABLE_BODY: &str =
    "A tabela com os dados da COVID-19 em Portugal do dia de hoje já se encontra disponível!";

/// Notification channel used for every post.
pub const DEFAULT_CHANNEL_KEY: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Importance {
    Default,
    High,
}

/// Identifier handed to the notification service. Posting twice with the same
/// id replaces the earlier notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    pub channel_key: &'static str,
    pub title: String,
    pub body: String,
    pub importance: Importance,
    /// Indicator light, RGB.
    pub light_color: [u8; 3],
    pub activation: Activation,
    pub deep_link: String,
}

impl NotificationPayload {
    /// "Today's table is available", opening the view at `view_url` when tapped.
    pub fn data_available(view_url: &str) -> Self {
        let activation = Activation::data_available();
        Self {
            channel_key: DEFAULT_CHANNEL_KEY,
            title: DATA_AVAILABLE_TITLE.to_string(),
            body: DATA_AVAILABLE_BODY.to_string(),
            importance: Importance::High,
            light_color: [0xff, 0x00, 0x00],
            deep_link: activation.deep_link(view_url),
            activation,
        }
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;

    #[test]
    fn data_available__should_build_high_importance_payload_with_deep_link() {
        // When
        let payload = NotificationPayload::data_available("http://127.0.0.1:3000");

        // Then
        assert_eq!(payload.title, DATA_AVAILABLE_TITLE);
        assert_eq!(payload.body, DATA_AVAILABLE_BODY);
        assert_eq!(payload.channel_key, "default");
        assert_eq!(payload.importance, Importance::High);
        assert_eq!(payload.light_color, [0xff, 0x00, 0x00]);
        assert!(payload.activation.covid_data_available);
        assert_eq!(
            payload.deep_link,
            "http://127.0.0.1:3000/?covidDataAvailable=true"
        );
    }
}
