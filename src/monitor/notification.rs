//! Notification values emitted when a geofence is entered.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::GeoEvent;

/// A one-time alert that the user entered an event's geofence.
///
/// Carries the triggering event with its display payload untouched, the
/// computed distance, and a kilometer figure rounded to one decimal for
/// display. Emission is fire-and-forget: there is no acknowledgement or
/// redelivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// The event whose geofence was entered.
    pub event: GeoEvent,

    /// Great-circle distance from the sample to the event, in meters.
    pub distance_meters: f64,

    /// `distance_meters` in kilometers, rounded to one decimal place.
    pub distance_km: f64,

    /// When the geofence entry was detected.
    pub raised_at: DateTime<Utc>,
}

impl Notification {
    pub(crate) fn new(event: GeoEvent, distance_meters: f64) -> Self {
        Self {
            event,
            distance_meters,
            distance_km: (distance_meters / 1000.0 * 10.0).round() / 10.0,
            raised_at: Utc::now(),
        }
    }

    /// In-app route to the event's detail view.
    ///
    /// Presentation layers that offer a "view details" follow-up action
    /// can navigate here; the monitor itself holds no navigation state.
    #[must_use]
    pub fn detail_route(&self) -> String {
        format!("/events/{}", self.event.id)
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} is happening {}km from your location",
            self.event.title, self.distance_km
        )
    }
}
