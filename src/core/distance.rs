use crate::models::{BoundingBox, CommutePreference};

/// Earth's radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Average door-to-door urban travel speed used when no routed commute is known
pub const URBAN_TRAVEL_SPEED_KMH: f64 = 25.0;

/// Fixed overhead (walking to a stop, waiting) added to every estimate
pub const COMMUTE_OVERHEAD_MINUTES: f64 = 5.0;

/// Calculate the Haversine distance between two points in kilometers
///
/// # Arguments
/// * `lat1` - Latitude of first point in degrees
/// * `lon1` - Longitude of first point in degrees
/// * `lat2` - Latitude of second point in degrees
/// * `lon2` - Longitude of second point in degrees
#[inline]
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Estimate commute minutes from straight-line distance
#[inline]
pub fn estimate_commute_minutes(from: (f64, f64), to: (f64, f64)) -> f64 {
    let km = haversine_distance(from.0, from.1, to.0, to.1);
    km / URBAN_TRAVEL_SPEED_KMH * 60.0 + COMMUTE_OVERHEAD_MINUTES
}

/// Radius reachable within `minutes` under the same speed model
#[inline]
pub fn reachable_radius_km(minutes: f64) -> f64 {
    ((minutes - COMMUTE_OVERHEAD_MINUTES).max(0.0) / 60.0) * URBAN_TRAVEL_SPEED_KMH
}

/// Calculate a bounding box around a center point
///
/// Much cheaper than Haversine for SQL pre-filtering.
/// 1° latitude ≈ 111km, 1° longitude ≈ 111km * cos(latitude)
pub fn calculate_bounding_box(lat: f64, lon: f64, radius_km: f64) -> BoundingBox {
    let lat_delta = radius_km / 111.0;
    let lon_delta = radius_km / (111.0 * lat.to_radians().cos().abs().max(1e-6));

    BoundingBox {
        min_lat: lat - lat_delta,
        max_lat: lat + lat_delta,
        min_lon: lon - lon_delta,
        max_lon: lon + lon_delta,
    }
}

/// Search area for a commute preference.
///
/// Covers everything reachable within twice the maximum commute, where
/// accessibility reaches zero. `None` when the anchor or limit is unusable.
pub fn commute_search_box(commute: &CommutePreference) -> Option<BoundingBox> {
    let usable = commute.latitude.is_finite()
        && commute.longitude.is_finite()
        && commute.max_minutes.is_finite()
        && commute.max_minutes > 0.0;
    if !usable {
        return None;
    }

    let radius = reachable_radius_km(2.0 * commute.max_minutes);
    Some(calculate_bounding_box(commute.latitude, commute.longitude, radius))
}

/// Check if a point is within a bounding box
#[inline]
pub fn is_within_bounding_box(lat: f64, lon: f64, bbox: &BoundingBox) -> bool {
    lat >= bbox.min_lat
        && lat <= bbox.max_lat
        && lon >= bbox.min_lon
        && lon <= bbox.max_lon
}
