//! Ellipsoidal polar stereographic projection (Snyder 1987, eqs. 21-33).
//!
//! Parameterised by a standard parallel rather than a scale factor, which is
//! how EPSG:3413 is defined: WGS84, true scale at 70°N, central meridian -45°.

use std::f64::consts::FRAC_PI_2;
use std::f64::consts::FRAC_PI_4;

/// WGS84 semi-major axis in metres.
pub const WGS84_A: f64 = 6_378_137.0;

/// WGS84 first eccentricity.
pub const WGS84_E: f64 = 0.081_819_190_842_6;

const MAX_ITERATIONS: usize = 15;
const TOLERANCE: f64 = 1e-12;

/// North-pole stereographic projection on an ellipsoid.
#[derive(Debug, Clone, Copy)]
pub struct PolarStereographic {
    a: f64,
    e: f64,
    lon0: f64,
    /// `a * m_c / t_c`, the radius scale at the standard parallel.
    k: f64,
}

impl PolarStereographic {
    pub fn new(a: f64, e: f64, lat_ts_deg: f64, lon0_deg: f64) -> Self {
        let phi_c = lat_ts_deg.to_radians();
        let m_c = phi_c.cos() / (1.0 - e * e * phi_c.sin().powi(2)).sqrt();
        let t_c = t(phi_c, e);
        Self {
            a,
            e,
            lon0: lon0_deg.to_radians(),
            k: a * m_c / t_c,
        }
    }

    /// EPSG:3413.
    pub fn nsidc_north() -> Self {
        Self::new(WGS84_A, WGS84_E, 70.0, -45.0)
    }

    pub fn semi_major_axis(&self) -> f64 {
        self.a
    }

    pub fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let rho = self.k * t(lat.to_radians(), self.e);
        let dlon = lon.to_radians() - self.lon0;
        (rho * dlon.sin(), -rho * dlon.cos())
    }

    /// Iterative inverse; converges in a handful of steps for `e` of WGS84.
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let rho = x.hypot(y);
        if rho == 0.0 {
            return (self.lon0.to_degrees(), 90.0);
        }
        let t_val = rho / self.k;
        let half_e = self.e / 2.0;

        let mut phi = FRAC_PI_2 - 2.0 * t_val.atan();
        for _ in 0..MAX_ITERATIONS {
            let es = self.e * phi.sin();
            let next = FRAC_PI_2 - 2.0 * (t_val * ((1.0 - es) / (1.0 + es)).powf(half_e)).atan();
            let delta = (next - phi).abs();
            phi = next;
            if delta < TOLERANCE {
                break;
            }
        }

        let lon = self.lon0 + x.atan2(-y);
        (super::normalize_lon(lon.to_degrees()), phi.to_degrees())
    }
}

fn t(phi: f64, e: f64) -> f64 {
    let es = e * phi.sin();
    (FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - es) / (1.0 + es)).powf(e / 2.0)
}
