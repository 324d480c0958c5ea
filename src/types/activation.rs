use serde::{Deserialize, Serialize};

pub const DATA_AVAILABLE_PARAM: &str = "covidDataAvailable";

/// Extras carried by a view activation, e.g. a tapped notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activation {
    #[serde(rename = "covidDataAvailable", default)]
    pub covid_data_available: bool,
}

impl Activation {
    pub fn data_available() -> Self {
        Self {
            covid_data_available: true,
        }
    }

    /// Deep link that reopens the view at `view_url` with these extras.
    pub fn deep_link(&self, view_url: &str) -> String {
        let base = view_url.trim_end_matches('/');
        format!(
            "{base}/?{DATA_AVAILABLE_PARAM}={}",
            self.covid_data_available
        )
    }
}
