use std::sync::Arc;

use chrono::{FixedOffset, Offset, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::store::KeyValueStore;

pub type SharedStore = Arc<dyn KeyValueStore>;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub http: Client,
    pub store: Option<SharedStore>,
}

impl AppState {
    pub fn store(&self) -> Option<&dyn KeyValueStore> {
        self.store.as_deref()
    }
}

/// One forecast slot. Vendor fields that were missing stay `None`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastSample {
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<u8>,
    #[serde(default)]
    pub wind_speed: Option<f64>,
    #[serde(default)]
    pub precipitation: Option<f64>,
    #[serde(default)]
    pub condition_text: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySample {
    #[serde(flatten)]
    pub sample: ForecastSample,
    #[serde(default)]
    pub temperature_min: Option<f64>,
    #[serde(default)]
    pub temperature_max: Option<f64>,
    #[serde(default)]
    pub rain_total: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastBundle {
    #[serde(default)]
    pub current: Option<ForecastSample>,
    #[serde(default)]
    pub hourly: Vec<ForecastSample>,
    #[serde(default)]
    pub daily: Vec<DailySample>,
    #[serde(default)]
    pub timezone_offset_seconds: i32,
}

impl ForecastBundle {
    /// UTC offset of the forecast location; out-of-range offsets fall back to UTC.
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.timezone_offset_seconds).unwrap_or_else(|| Utc.fix())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Advisory {
    pub title: String,
    pub description: String,
    pub recommended_action: String,
    pub priority: Priority,
}

impl Advisory {
    pub fn new(
        title: &str,
        description: impl Into<String>,
        recommended_action: &str,
        priority: Priority,
    ) -> Self {
        Self {
            title: title.to_string(),
            description: description.into(),
            recommended_action: recommended_action.to_string(),
            priority,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SprayWindow {
    pub timestamp: i64,
    pub temperature: f64,
    pub wind_speed: f64,
    pub humidity: u8,
}
