//! Error types for the geofence engine.
//!
//! All errors are strongly typed using thiserror. Validation errors cover
//! caller-supplied data (coordinates, configuration); position errors cover
//! failures reported by the external position source. Neither is fatal to a
//! running monitor.

use thiserror::Error;

/// Validation errors for caller-supplied input.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("latitude {value} is out of range [-90, 90]")]
    LatitudeOutOfRange {
        value: f64,
    },

    #[error("longitude {value} is out of range [-180, 180]")]
    LongitudeOutOfRange {
        value: f64,
    },

    #[error("geofence radius must be finite and positive, got {value} m")]
    InvalidRadius {
        value: f64,
    },

    #[error("event id cannot be empty")]
    EmptyEventId,
}

/// Failures reported by the position source.
///
/// These are delivered through the error path of a watch subscription and
/// never stop the watch: the monitor logs the failure and waits for the
/// next sample.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PositionError {
    #[error("position fix timed out after {duration_ms}ms")]
    AcquisitionTimeout {
        duration_ms: u64,
    },

    #[error("position access permission denied")]
    PermissionDenied,

    #[error("position unavailable: {message}")]
    Unavailable {
        message: String,
    },

    #[error("continuous position watching is not supported by this source")]
    WatchUnsupported,
}

/// Top-level error type for the geofence engine.
#[derive(Debug, Error)]
pub enum GeofenceError {
    /// Invalid caller-supplied input.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The position source failed to deliver a fix.
    #[error("position error: {0}")]
    Position(#[from] PositionError),

    /// The monitor was stopped; only a fresh catalog load resumes it.
    #[error("monitor is stopped; re-initialize with a new catalog to resume watching")]
    MonitorStopped,

    /// A channel endpoint went away (worker or consumer dropped).
    #[error("{channel} channel disconnected")]
    Disconnected {
        /// Name of the disconnected channel.
        channel: &'static str,
    },

    /// A blocking receive gave up waiting.
    #[error("receive timed out after {duration_ms}ms")]
    RecvTimeout {
        /// How long the receive waited.
        duration_ms: u64,
    },
}

impl GeofenceError {
    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a position-source error.
    #[must_use]
    pub const fn is_position(&self) -> bool {
        matches!(self, Self::Position(_))
    }

    /// Returns true if this error can resolve on its own with a later
    /// sample (position failures and receive timeouts), as opposed to bad
    /// input or a torn-down monitor.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Position(_) | Self::RecvTimeout { .. })
    }
}

/// Result type alias for geofence operations.
pub type GeofenceResult<T> = Result<T, GeofenceError>;
