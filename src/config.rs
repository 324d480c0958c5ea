use crate::error::ConfigError;
use crate::types::ChannelSubscription;

use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use time::Date;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

pub const DEFAULT_APP_KEY: &str = "98a6a8bb2fc2375f46b1";
pub const DEFAULT_CLUSTER: &str = "eu";
pub const DEFAULT_CHANNEL: &str = "energized-atoll-189";
pub const DEFAULT_EVENT: &str = "covid-data-available";
pub const DEFAULT_TABLE_URL: &str = "https://portugal-daily-covid-table.herokuapp.com/tables/html";
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_VIEW_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 3000);

const MAX_CHANNEL_NAME_LEN: usize = 164;
const TABLE_DATE_INPUT: &[BorrowedFormatItem<'static>] =
    format_description!("[day padding:none]-[month padding:none]-[year]");
const TABLE_DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[day]-[month]-[year]");

/// How notification ids are allocated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NotificationIdScheme {
    /// Process uptime in milliseconds, truncated to 32 bits. Two events in the
    /// same millisecond share an id and the second replaces the first.
    Uptime,
    /// Atomically incremented counter.
    #[default]
    Counter,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub subscription: ChannelSubscription,
    pub table_url: String,
    pub fetch_timeout: Duration,
    pub view_addr: SocketAddr,
    pub notification_ids: NotificationIdScheme,
}

impl AppConfig {
    pub fn view_url(&self) -> String {
        format!("http://{}", self.view_addr)
    }

    /// Rejects anything that would make the listener or the fetch unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let subscription = &self.subscription;
        if subscription.app_key.is_empty()
            || !subscription
                .app_key
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric())
        {
            return Err(ConfigError::AppKey(subscription.app_key.clone()));
        }
        if subscription.cluster.is_empty()
            || !subscription
                .cluster
                .chars()
                .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-')
        {
            return Err(ConfigError::Cluster(subscription.cluster.clone()));
        }
        if !is_valid_channel_name(&subscription.channel) {
            return Err(ConfigError::Channel(subscription.channel.clone()));
        }
        if subscription.event.trim().is_empty() {
            return Err(ConfigError::EmptyEvent);
        }
        match reqwest::Url::parse(&self.table_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => return Err(ConfigError::TableUrl(self.table_url.clone())),
        }
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::Timeout);
        }
        Ok(())
    }

    /// The table URL, pinned to `date` (DD-MM-YYYY) when one is given.
    pub fn table_url_for(&self, date: Option<&str>) -> Result<String, ConfigError> {
        let Some(date) = date else {
            return Ok(self.table_url.clone());
        };
        let parsed = Date::parse(date.trim(), TABLE_DATE_INPUT)
            .map_err(|_| ConfigError::Date(date.to_string()))?;
        let formatted = parsed
            .format(TABLE_DATE_FORMAT)
            .map_err(|_| ConfigError::Date(date.to_string()))?;
        let mut url = reqwest::Url::parse(&self.table_url)
            .map_err(|_| ConfigError::TableUrl(self.table_url.clone()))?;
        url.query_pairs_mut().append_pair("date", &formatted);
        Ok(url.into())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            subscription: ChannelSubscription {
                app_key: DEFAULT_APP_KEY.to_string(),
                cluster: DEFAULT_CLUSTER.to_string(),
                channel: DEFAULT_CHANNEL.to_string(),
                event: DEFAULT_EVENT.to_string(),
            },
            table_url: DEFAULT_TABLE_URL.to_string(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            view_addr: SocketAddr::from(DEFAULT_VIEW_ADDR),
            notification_ids: NotificationIdScheme::default(),
        }
    }
}

fn is_valid_channel_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_CHANNEL_NAME_LEN
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || "_-=@,.;".contains(ch))
}
