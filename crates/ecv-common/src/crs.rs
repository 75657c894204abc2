//! Coordinate Reference System types and constants.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::bbox::CrsBounds;
use crate::error::EngineError;

/// Half the width of the spherical Mercator world square, in metres.
pub const WEB_HALF_EXTENT: f64 = 20037508.342789244;

/// Latitude limit of the spherical Mercator square.
pub const WEB_MAX_LAT: f64 = 85.051129;

/// Registered extent of EPSG:3413 as used by the polar pyramids.
pub const POLAR_EXTENT: [f64; 4] = [-3_850_000.0, -5_350_000.0, 3_750_000.0, 5_850_000.0];

/// Nominal resolution (metres per pixel) of polar pyramid level 0.
pub const POLAR_BASE_RESOLUTION: f64 = 29_687.5;

/// The two CRSs the engine knows how to display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Crs {
    /// Spherical Mercator, EPSG:3857.
    Web,
    /// NSIDC Sea Ice Polar Stereographic North, EPSG:3413.
    Polar,
}

impl Crs {
    pub fn epsg_code(&self) -> &'static str {
        match self {
            Crs::Web => "EPSG:3857",
            Crs::Polar => "EPSG:3413",
        }
    }

    /// Valid latitude range `(min, max)` in degrees.
    pub fn valid_lat_range(&self) -> (f64, f64) {
        match self {
            Crs::Web => (-WEB_MAX_LAT, WEB_MAX_LAT),
            Crs::Polar => (0.0, 90.0),
        }
    }

    pub fn is_valid_lat(&self, lat: f64) -> bool {
        let (min, max) = self.valid_lat_range();
        lat.is_finite() && lat >= min && lat <= max
    }

    pub fn clamp_lat(&self, lat: f64) -> f64 {
        let (min, max) = self.valid_lat_range();
        lat.clamp(min, max)
    }

    /// Full extent of the CRS in its native units.
    pub fn extent(&self) -> CrsBounds {
        match self {
            Crs::Web => CrsBounds::new(
                -WEB_HALF_EXTENT,
                -WEB_HALF_EXTENT,
                WEB_HALF_EXTENT,
                WEB_HALF_EXTENT,
            ),
            Crs::Polar => CrsBounds::new(
                POLAR_EXTENT[0],
                POLAR_EXTENT[1],
                POLAR_EXTENT[2],
                POLAR_EXTENT[3],
            ),
        }
    }

    /// Nominal polar pyramid resolution at `level`; each level halves the previous.
    pub fn polar_level_resolution(level: usize) -> f64 {
        POLAR_BASE_RESOLUTION / f64::powi(2.0, level.min(62) as i32)
    }

    /// Ground resolution of a web-mercator viewport at `zoom` (256 px tiles),
    /// or the equivalent scale of a polar viewport.
    pub fn metres_per_pixel(&self, zoom: f64) -> f64 {
        let world_px = 256.0 * f64::powf(2.0, zoom);
        match self {
            Crs::Web => 2.0 * WEB_HALF_EXTENT / world_px,
            Crs::Polar => {
                let extent = self.extent();
                extent.width().max(extent.height()) / world_px
            }
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Crs::Web => "web",
            Crs::Polar => "polar",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Crs {
    type Err = EngineError;

    /// Accepts the short names as well as EPSG codes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "WEB" | "EPSG:3857" | "EPSG:900913" => Ok(Crs::Web),
            "POLAR" | "EPSG:3413" => Ok(Crs::Polar),
            _ => Err(EngineError::config(format!("unsupported CRS: {}", s))),
        }
    }
}
