//! Geographic distance and projection helpers.
//!
//! All radius handling works in meters; the spatial index stores raw degree
//! coordinates, so queries convert meters to degree spans with a fixed local
//! equirectangular projection. That approximation is fine at city scale,
//! where the deduplication radius is tens of meters.

use crate::GeoPoint;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Meters per degree of latitude (constant everywhere on the ellipsoid
/// to within ~0.5%).
pub const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// Longitude degrees shrink with cos(latitude); clamp the scale so queries
/// near the poles stay finite instead of dividing by zero.
const MIN_LNG_SCALE: f64 = 0.01;

/// Great-circle distance between two points in meters.
pub fn haversine_distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlng = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().asin()
}

/// Degrees of latitude spanned by `meters`.
pub fn lat_degrees(meters: f64) -> f64 {
    meters / METERS_PER_DEGREE_LAT
}

/// Degrees of longitude spanned by `meters` at `reference_lat`.
pub fn lng_degrees(meters: f64, reference_lat: f64) -> f64 {
    let scale = reference_lat.to_radians().cos().max(MIN_LNG_SCALE);
    meters / (METERS_PER_DEGREE_LAT * scale)
}
