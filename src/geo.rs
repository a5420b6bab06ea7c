//! Geodesy helpers — pure math shared by the ingestion gate and route cache.
//!
//! DESIGN
//! ======
//! The speed guard and the route-drift check both measure great-circle
//! distance; they must agree, so both call the single haversine here.
//! Everything in this module is deterministic and I/O-free.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

// =============================================================================
// COORD
// =============================================================================

/// A WGS84 coordinate pair. The only coordinate representation in the crate;
/// requests are normalized into this shape at the schema boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub lat: f64,
    pub lng: f64,
}

impl Coord {
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// True for the (0, 0) sentinel a GPS-less device reports.
    #[must_use]
    pub fn is_null_island(self) -> bool {
        self.lat == 0.0 && self.lng == 0.0
    }
}

// =============================================================================
// DISTANCE / BEARING
// =============================================================================

/// Great-circle distance between two coordinates in meters (haversine).
#[must_use]
pub fn haversine_m(a: Coord, b: Coord) -> f64 {
    let phi_a = a.lat.to_radians();
    let phi_b = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lng - a.lng).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi_a.cos() * phi_b.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Initial bearing from `a` to `b` in degrees, normalized to `[0, 360)`.
#[must_use]
pub fn bearing_deg(a: Coord, b: Coord) -> f64 {
    let phi_a = a.lat.to_radians();
    let phi_b = b.lat.to_radians();
    let d_lambda = (b.lng - a.lng).to_radians();

    let y = d_lambda.sin() * phi_b.cos();
    let x = phi_a.cos() * phi_b.sin() - phi_a.sin() * phi_b.cos() * d_lambda.cos();
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

// =============================================================================
// INTERPOLATION
// =============================================================================

/// Linear interpolation. No clamping: callers own the validity of `t`.
#[must_use]
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Componentwise linear interpolation of a coordinate pair.
#[must_use]
pub fn lerp_coord(a: Coord, b: Coord, t: f64) -> Coord {
    Coord::new(lerp(a.lat, b.lat, t), lerp(a.lng, b.lng, t))
}

// =============================================================================
// FORMATTING
// =============================================================================

/// Human-readable distance: integer meters below 1 km, else km to 1 decimal.
#[must_use]
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{} m", meters.round() as i64)
    } else {
        format!("{:.1} km", meters / 1000.0)
    }
}

/// Human-readable duration: "< 1 min" under a minute, whole minutes under an
/// hour, otherwise hours and minutes with zero minutes omitted.
#[must_use]
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        return "< 1 min".to_string();
    }
    let minutes = (seconds / 60.0).floor() as i64;
    if minutes < 60 {
        return format!("{minutes} min");
    }
    let hours = minutes / 60;
    let rem = minutes % 60;
    if rem == 0 {
        format!("{hours}h")
    } else {
        format!("{hours}h {rem}m")
    }
}

#[cfg(test)]
#[path = "geo_test.rs"]
mod tests;
