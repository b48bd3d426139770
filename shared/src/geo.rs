//! Great-circle helpers on a spherical Earth.

use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine formula
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A geographic coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Builds a point from optional coordinates, treating unknown values as 0
    pub fn or_origin(lat: Option<f64>, lng: Option<f64>) -> Self {
        Self {
            lat: lat.unwrap_or(0.0),
            lng: lng.unwrap_or(0.0),
        }
    }
}

/// Haversine distance between two points in meters.
///
/// The square-root term is clamped to 1 so rounding on near-antipodal
/// inputs cannot push `asin` out of its domain.
pub fn distance(a: LatLng, b: LatLng) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
}

/// Moves `start` toward `target` by at most `max_step` meters.
///
/// Returns `target` itself once it is within reach. Otherwise latitude and
/// longitude are interpolated linearly, which is close enough to the geodesic
/// for per-tick steps.
pub fn step_toward(start: LatLng, target: LatLng, max_step: f64) -> LatLng {
    let max_step = max_step.max(0.0);
    let dist = distance(start, target);
    if dist <= max_step || dist == 0.0 {
        return target;
    }

    let ratio = max_step / dist;
    LatLng {
        lat: start.lat + (target.lat - start.lat) * ratio,
        lng: start.lng + (target.lng - start.lng) * ratio,
    }
}
