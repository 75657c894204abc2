//! Map viewport as reported by the renderer.

use serde::{Deserialize, Serialize};

use crate::bbox::GeoBounds;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

impl LonLat {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// Camera state: centre, fractional zoom and the visible geographic bounds
/// when the renderer knows them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub center: LonLat,
    pub zoom: f64,
    #[serde(default)]
    pub bounds: Option<GeoBounds>,
}

impl Viewport {
    pub fn new(center: LonLat, zoom: f64) -> Self {
        Self {
            center,
            zoom,
            bounds: None,
        }
    }

    pub fn with_bounds(mut self, bounds: GeoBounds) -> Self {
        self.bounds = Some(bounds);
        self
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(LonLat::new(0.0, 0.0), 0.0)
    }
}
