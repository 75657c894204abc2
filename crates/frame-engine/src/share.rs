//! Shareable view state, serialised as a URL query string.
//!
//! `dataset=sst&year=2001&time=4&lon=10.5&lat=-3.0&zoom=2.25&cmap=Viridis&opacity=0.8`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use ecv_common::{ColourMapName, DatasetId, EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareState {
    pub dataset: DatasetId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default)]
    pub time: usize,
    #[serde(default)]
    pub lon: f64,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub zoom: f64,
    #[serde(
        rename = "cmap",
        default = "default_colour_map",
        deserialize_with = "colour_map_any_case"
    )]
    pub colour_map: ColourMapName,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
}

fn default_colour_map() -> ColourMapName {
    ColourMapName::Viridis
}

fn default_opacity() -> f32 {
    1.0
}

fn colour_map_any_case<'de, D>(deserializer: D) -> Result<ColourMapName, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    name.parse().map_err(serde::de::Error::custom)
}

impl ShareState {
    pub fn to_query_string(&self) -> String {
        serde_urlencoded::to_string(self).unwrap_or_default()
    }

    /// Parse a query string, with or without a leading `?`. Unknown keys
    /// are ignored; `dataset` is required.
    pub fn from_query_string(query: &str) -> EngineResult<Self> {
        let mut state: ShareState = serde_urlencoded::from_str(query.trim_start_matches('?'))
            .map_err(|e| EngineError::config(format!("invalid shared state: {}", e)))?;
        if state.dataset.as_str().is_empty() {
            return Err(EngineError::config("shared state is missing 'dataset'"));
        }
        state.opacity = state.opacity.clamp(0.0, 1.0);
        Ok(state)
    }
}

impl fmt::Display for ShareState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query_string())
    }
}

impl FromStr for ShareState {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_query_string(s)
    }
}
