//! Per-sample geofence evaluation.
//!
//! The sweep is a pure reduction over the catalog; dispatch to consumers
//! stays in the service worker.

use std::collections::HashSet;

use crate::catalog::{EventId, GeoEvent};
use crate::geo::haversine;
use crate::position::PositionSample;

use super::notification::Notification;

/// Sweeps the catalog once for one position sample.
///
/// Every event within `radius_meters` of the sample whose id is not yet
/// in `notified` produces a notification and is recorded; an event
/// already in the set never fires again. Each event is evaluated
/// independently, exactly once per sample; ordering across events is
/// unspecified.
pub fn sweep_catalog(
    catalog: &[GeoEvent],
    notified: &mut HashSet<EventId>,
    radius_meters: f64,
    sample: &PositionSample,
) -> Vec<Notification> {
    let mut fired = Vec::new();

    for event in catalog {
        let distance = haversine::distance_meters(&sample.coordinate, &event.coordinate);
        if distance <= radius_meters && !notified.contains(&event.id) {
            notified.insert(event.id.clone());
            fired.push(Notification::new(event.clone(), distance));
        }
    }

    fired
}
