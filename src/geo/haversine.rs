//! Great-circle distance on a spherical Earth model.

use super::coordinate::Coordinate;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Computes the great-circle distance between two coordinates in meters
/// using the Haversine formula.
///
/// The result is symmetric, non-negative, and ~0 for identical points.
/// Both inputs must satisfy the [`Coordinate`] range invariant; behavior
/// for out-of-range values is unspecified.
///
/// # Examples
///
/// ```
/// use geofence::{haversine, Coordinate};
///
/// let a = Coordinate::new(0.0, 0.0).unwrap();
/// let b = Coordinate::new(0.0, 1.0).unwrap();
/// let d = haversine::distance_meters(&a, &b);
/// assert!((d - 111_195.0).abs() < 10.0);
/// ```
#[must_use]
pub fn distance_meters(a: &Coordinate, b: &Coordinate) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let delta_phi = (b.latitude - a.latitude).to_radians();
    let delta_lambda = (b.longitude - a.longitude).to_radians();

    let h = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c
}
