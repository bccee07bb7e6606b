//! Proximity-monitoring subsystem.
//!
//! The monitor correlates position samples from an external source
//! against the event catalog and emits one notification per event the
//! first time its geofence is entered. It is embedded-first: the
//! [`NotificationStream`] handle is the consumer surface, and a host UI
//! layers its own rendering on top.

/// Per-sample geofence evaluation.
pub mod evaluate;
/// Notification value types.
pub mod notification;
/// The monitor service and its worker.
pub mod service;
/// Subscriber stream handle.
pub mod stream;

pub use notification::Notification;
pub use service::{
    MonitorConfig, MonitorState, ProximityMonitor, DEFAULT_GEOFENCE_RADIUS_METERS,
};
pub use stream::NotificationStream;
