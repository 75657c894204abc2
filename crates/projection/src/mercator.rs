//! Spherical (web) Mercator, EPSG:3857.

use ecv_common::crs::WEB_HALF_EXTENT;
use ecv_common::{EngineError, EngineResult};
use std::f64::consts::PI;

/// Sphere radius used by EPSG:3857.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct WebMercator;

impl WebMercator {
    /// Degrees to metres. Latitude must already be within the valid band.
    pub fn forward(lon: f64, lat: f64) -> (f64, f64) {
        let x = EARTH_RADIUS * lon.to_radians();
        let y = EARTH_RADIUS * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
        (x, y)
    }

    /// Metres to degrees; points outside the world square are rejected.
    pub fn inverse(x: f64, y: f64) -> EngineResult<(f64, f64)> {
        let limit = WEB_HALF_EXTENT * (1.0 + 1e-9);
        if x.abs() > limit || y.abs() > limit {
            return Err(EngineError::projection(format!(
                "({}, {}) outside the web mercator square",
                x, y
            )));
        }
        let lon = (x / EARTH_RADIUS).to_degrees();
        let lat = (y / EARTH_RADIUS).sinh().atan().to_degrees();
        Ok((lon, lat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_corner() {
        let (x, y) = WebMercator::forward(180.0, 85.0511287798066);
        assert!((x - WEB_HALF_EXTENT).abs() < 1e-6);
        assert!((y - WEB_HALF_EXTENT).abs() < 1.0);
    }

    #[test]
    fn test_origin() {
        let (x, y) = WebMercator::forward(0.0, 0.0);
        assert!(x.abs() < 1e-9 && y.abs() < 1e-6);
        let (lon, lat) = WebMercator::inverse(0.0, 0.0).unwrap();
        assert_eq!((lon, lat), (0.0, 0.0));
    }

    #[test]
    fn test_inverse_rejects_outside() {
        assert!(WebMercator::inverse(2.1e7, 0.0).is_err());
    }
}
