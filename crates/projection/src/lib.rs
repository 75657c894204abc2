//! Coordinate reference system transformations.
//!
//! Implements the two display projections from scratch: spherical Mercator
//! (EPSG:3857) and NSIDC north polar stereographic (EPSG:3413). Both entry
//! points reject input outside the CRS's valid domain with a `Projection`
//! error.

pub mod mercator;
pub mod polar;

pub use mercator::WebMercator;
pub use polar::PolarStereographic;

use ecv_common::{Crs, EngineError, EngineResult};

/// Project geographic coordinates (degrees) into `crs`.
pub fn to_crs(crs: Crs, lon: f64, lat: f64) -> EngineResult<(f64, f64)> {
    if !lon.is_finite() || !lat.is_finite() {
        return Err(EngineError::projection(format!(
            "non-finite coordinate ({}, {})",
            lon, lat
        )));
    }
    if !crs.is_valid_lat(lat) {
        return Err(EngineError::projection(format!(
            "latitude {} outside valid range of {}",
            lat,
            crs.epsg_code()
        )));
    }
    let lon = normalize_lon(lon);
    Ok(match crs {
        Crs::Web => WebMercator::forward(lon, lat),
        Crs::Polar => PolarStereographic::nsidc_north().forward(lon, lat),
    })
}

/// Inverse of [`to_crs`]: CRS metres back to `(lon, lat)` in degrees.
pub fn from_crs(crs: Crs, x: f64, y: f64) -> EngineResult<(f64, f64)> {
    if !x.is_finite() || !y.is_finite() {
        return Err(EngineError::projection(format!(
            "non-finite coordinate ({}, {})",
            x, y
        )));
    }
    let (lon, lat) = match crs {
        Crs::Web => WebMercator::inverse(x, y)?,
        Crs::Polar => PolarStereographic::nsidc_north().inverse(x, y),
    };
    if !crs.is_valid_lat(lat) {
        return Err(EngineError::projection(format!(
            "({}, {}) maps to latitude {} outside {}",
            x,
            y,
            lat,
            crs.epsg_code()
        )));
    }
    Ok((lon, lat))
}

/// Project with the latitude clamped into the CRS's valid range first.
pub fn to_crs_clamped(crs: Crs, lon: f64, lat: f64) -> EngineResult<(f64, f64)> {
    to_crs(crs, lon, crs.clamp_lat(lat))
}

/// Wrap a longitude into [-180, 180].
pub fn normalize_lon(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        return lon;
    }
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && lon > 0.0 {
        180.0
    } else {
        wrapped
    }
}
