//! Geospatial primitives.
//!
//! This module groups the validated coordinate type and the great-circle
//! distance calculator. Everything here is pure: no state, no clocks, no
//! channels.

pub mod coordinate;
pub mod haversine;

pub use coordinate::Coordinate;
pub use haversine::{distance_meters, EARTH_RADIUS_METERS};
