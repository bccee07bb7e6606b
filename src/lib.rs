//! # geofence - location-based event notifications
//!
//! `geofence` correlates a user's evolving position against a catalog of
//! geotagged events and raises a one-time notification per event the
//! first time the user comes within a configurable radius of it.
//!
//! ## Core Concepts
//!
//! - **Coordinate**: a validated (latitude, longitude) pair in decimal degrees
//! - **GeoEvent**: a catalog entry with a stable id, a location, and an
//!   opaque display payload
//! - **Proximity Monitor**: the stateful service owning the watch
//!   subscription, the catalog snapshot, and the notified set
//! - **Notification**: the fire-and-forget value handed to the
//!   presentation layer when a geofence is first entered
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use geofence::{ManualPositionSource, MonitorConfig, ProximityMonitor, RawEvent};
//!
//! let source = ManualPositionSource::new();
//! let monitor = ProximityMonitor::new(MonitorConfig::default(), Arc::new(source.clone()))?;
//!
//! let records: Vec<RawEvent> = serde_json::from_str(catalog_json)?;
//! let stream = monitor.init(records)?;
//!
//! // The position source pushes samples; the presentation layer drains
//! // notifications from the stream.
//! while let Ok(notification) = stream.recv() {
//!     println!("{notification}");
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod catalog;
pub mod error;
pub mod geo;
pub mod position;

// The monitoring service
pub mod monitor;

// Re-export primary types at crate root for convenience
pub use catalog::{normalize_events, CoordValue, EventId, GeoEvent, NormalizedCatalog, RawEvent};
pub use error::{GeofenceError, GeofenceResult, PositionError, ValidationError};
pub use geo::{haversine, Coordinate, EARTH_RADIUS_METERS};
pub use monitor::{
    MonitorConfig, MonitorState, Notification, NotificationStream, ProximityMonitor,
    DEFAULT_GEOFENCE_RADIUS_METERS,
};
pub use position::{
    ManualPositionSource, PositionSample, PositionSink, PositionSource, WatchHandle, WatchId,
    WatchOptions, DEFAULT_ACQUISITION_TIMEOUT, DEFAULT_MAXIMUM_AGE,
};
