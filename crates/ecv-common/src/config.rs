//! Engine configuration.
//!
//! Loaded once at startup (YAML file, then environment overrides) and passed
//! explicitly to the components that need it.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::dataset::DatasetDescriptor;
use crate::error::{EngineError, EngineResult};
use crate::registry::DatasetRegistry;

/// Duration of one display frame; the floor for every debounce.
pub const FRAME_MS: u64 = 16;

/// Capacities of the three cache tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheCapacities {
    pub metadata: usize,
    pub raw: usize,
    pub rendered: usize,
}

impl Default for CacheCapacities {
    fn default() -> Self {
        Self {
            metadata: 32,
            raw: 128,
            rendered: 64,
        }
    }
}

/// Prefetch behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    pub enabled: bool,
    pub debounce_ms: u64,
    pub time_lookahead: usize,
    pub time_lookbehind: usize,
    pub year_lookahead: usize,
    pub level_lookahead: usize,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 300,
            time_lookahead: 2,
            time_lookbehind: 2,
            year_lookahead: 1,
            level_lookahead: 1,
        }
    }
}

impl PrefetchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Display defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub default_opacity: f32,
    /// Factor applied to the current frame's opacity while a reload runs.
    pub reload_dim_factor: f32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            default_opacity: 1.0,
            reload_dim_factor: 0.7,
        }
    }
}

/// Slice loader knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Padding around a viewport-scoped read.
    pub viewport_margin_px: usize,
    /// Planes with fewer pixels than this are always read whole.
    pub viewport_crop_min_pixels: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            viewport_margin_px: 32,
            viewport_crop_min_pixels: 1_048_576,
        }
    }
}

fn default_api_base_url() -> String {
    "http://localhost:8000/data".to_string()
}

fn default_lod_debounce_ms() -> u64 {
    250
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base URL of the chunked store.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default)]
    pub datasets: Vec<DatasetDescriptor>,

    #[serde(default)]
    pub cache_capacities: CacheCapacities,

    #[serde(default)]
    pub prefetch: PrefetchConfig,

    #[serde(default)]
    pub display: DisplayConfig,

    #[serde(default)]
    pub loader: LoaderConfig,

    #[serde(default = "default_lod_debounce_ms")]
    pub lod_debounce_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            datasets: Vec::new(),
            cache_capacities: CacheCapacities::default(),
            prefetch: PrefetchConfig::default(),
            display: DisplayConfig::default(),
            loader: LoaderConfig::default(),
            lod_debounce_ms: default_lod_debounce_ms(),
        }
    }
}

impl EngineConfig {
    /// Parse a YAML document.
    pub fn from_yaml(yaml: &str) -> EngineResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Apply `ECV_*` environment overrides on top of the current values.
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok());
        self
    }

    /// Apply overrides from an arbitrary lookup; unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("ECV_API_BASE_URL") {
            self.api_base_url = val;
        }

        let parse_usize = |key: &str| lookup(key).and_then(|v| v.trim().parse::<usize>().ok());
        let parse_u64 = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(n) = parse_usize("ECV_CACHE_METADATA") {
            self.cache_capacities.metadata = n;
        }
        if let Some(n) = parse_usize("ECV_CACHE_RAW") {
            self.cache_capacities.raw = n;
        }
        if let Some(n) = parse_usize("ECV_CACHE_RENDERED") {
            self.cache_capacities.rendered = n;
        }
        if let Some(ms) = parse_u64("ECV_PREFETCH_DEBOUNCE_MS") {
            self.prefetch.debounce_ms = ms;
        }
        if let Some(ms) = parse_u64("ECV_LOD_DEBOUNCE_MS") {
            self.lod_debounce_ms = ms;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(EngineError::config("api_base_url must not be empty"));
        }
        let caps = self.cache_capacities;
        if caps.metadata == 0 || caps.raw == 0 || caps.rendered == 0 {
            return Err(EngineError::config("cache capacities must be > 0"));
        }
        let display = self.display;
        if !(0.0..=1.0).contains(&display.default_opacity) {
            return Err(EngineError::config("default_opacity must be within 0..=1"));
        }
        if !(0.0..=1.0).contains(&display.reload_dim_factor) {
            return Err(EngineError::config("reload_dim_factor must be within 0..=1"));
        }
        if self.loader.viewport_crop_min_pixels == 0 {
            return Err(EngineError::config("viewport_crop_min_pixels must be > 0"));
        }
        Ok(())
    }

    /// LOD debounce window, never shorter than one frame.
    pub fn lod_debounce(&self) -> Duration {
        Duration::from_millis(self.lod_debounce_ms.max(FRAME_MS))
    }

    /// Validate every dataset and build the registry.
    pub fn build_registry(&self) -> EngineResult<DatasetRegistry> {
        DatasetRegistry::from_descriptors(self.datasets.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.cache_capacities.metadata, 32);
        assert_eq!(config.cache_capacities.raw, 128);
        assert_eq!(config.cache_capacities.rendered, 64);
        assert_eq!(config.prefetch.debounce_ms, 300);
        assert_eq!(config.lod_debounce(), Duration::from_millis(250));
        assert_eq!(config.loader.viewport_margin_px, 32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = EngineConfig::from_yaml(
            "api_base_url: https://example.org/zarr\ncache_capacities:\n  raw: 8\n",
        )
        .unwrap();
        assert_eq!(config.api_base_url, "https://example.org/zarr");
        assert_eq!(config.cache_capacities.raw, 8);
        assert_eq!(config.cache_capacities.rendered, 64);
        assert!(config.prefetch.enabled);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("ECV_CACHE_RENDERED", "5"),
            ("ECV_LOD_DEBOUNCE_MS", "0"),
            ("ECV_CACHE_RAW", "lots"),
        ]
        .into_iter()
        .collect();
        let mut config = EngineConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.cache_capacities.rendered, 5);
        assert_eq!(config.cache_capacities.raw, 128);
        assert_eq!(config.lod_debounce(), Duration::from_millis(FRAME_MS));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = EngineConfig::default();
        config.cache_capacities.raw = 0;
        assert!(config.validate().is_err());
    }
}
