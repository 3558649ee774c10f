use foundation::Duration;
use serde::{Deserialize, Serialize};

use crate::error::StateError;

pub const DEFAULT_STORAGE_KEY: &str = "iemone_state";
pub const DEFAULT_TICK_PERIOD_MS: u32 = 60_000;
pub const DEFAULT_BASE_LAYER: &str = "esri-hybrid";

/// Compiled-in defaults, overridable by the host page or the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DashboardConfig {
    /// Durable storage key holding the snapshot blob.
    pub storage_key: String,
    /// Live-mode refresh period.
    pub tick_period_ms: u32,
    pub home_lat: f64,
    pub home_lon: f64,
    pub home_zoom: f64,
    pub base_layer: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            tick_period_ms: DEFAULT_TICK_PERIOD_MS,
            home_lat: 39.8283,
            home_lon: -98.5795,
            home_zoom: 4.0,
            base_layer: DEFAULT_BASE_LAYER.to_string(),
        }
    }
}

impl DashboardConfig {
    /// Missing fields fall back to defaults; malformed JSON is an error.
    pub fn from_json(raw: &str) -> Result<Self, StateError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(raw)?)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::milliseconds(i64::from(self.tick_period_ms))
    }
}
