//! Geographic coordinates in decimal degrees.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A geographic position as (latitude, longitude) in decimal degrees.
///
/// The validated constructor enforces latitude ∈ [-90, 90] and
/// longitude ∈ [-180, 180]. Code downstream of [`Coordinate::new`] may
/// assume both invariants hold; the distance calculator in particular
/// does not re-check them.
///
/// # Examples
///
/// ```
/// use geofence::Coordinate;
///
/// let delhi = Coordinate::new(28.6139, 77.2090).unwrap();
/// assert_eq!(delhi.latitude, 28.6139);
///
/// assert!(Coordinate::new(91.0, 0.0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in decimal degrees, positive north.
    pub latitude: f64,
    /// Longitude in decimal degrees, positive east.
    pub longitude: f64,
}

impl Coordinate {
    /// Creates a coordinate, validating both components.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::LatitudeOutOfRange`] or
    /// [`ValidationError::LongitudeOutOfRange`] for out-of-range or
    /// non-finite components.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(ValidationError::LatitudeOutOfRange { value: latitude });
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(ValidationError::LongitudeOutOfRange { value: longitude });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.latitude, self.longitude)
    }
}
