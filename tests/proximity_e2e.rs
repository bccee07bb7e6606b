use std::sync::Arc;
use std::time::Duration;

use geofence::{
    Coordinate, CoordValue, EventId, GeofenceError, ManualPositionSource, MonitorConfig,
    MonitorState, PositionError, PositionSample, ProximityMonitor, RawEvent,
    EARTH_RADIUS_METERS,
};

fn record(id: i64, lat: f64, lon: f64, title: &str) -> RawEvent {
    RawEvent {
        id: Some(EventId::from(id)),
        latitude: Some(CoordValue::Number(lat)),
        longitude: Some(CoordValue::Number(lon)),
        title: title.to_string(),
        ..RawEvent::default()
    }
}

fn sample(lat: f64, lon: f64) -> PositionSample {
    PositionSample::new(Coordinate::new(lat, lon).unwrap())
}

/// A latitude whose great-circle distance from (0, 0) is exactly `meters`
/// under the spherical model.
fn latitude_at_meters(meters: f64) -> f64 {
    (meters / EARTH_RADIUS_METERS).to_degrees()
}

fn monitor_with_source(cfg: MonitorConfig) -> (ProximityMonitor, ManualPositionSource) {
    let source = ManualPositionSource::new();
    let monitor = ProximityMonitor::new(cfg, Arc::new(source.clone())).unwrap();
    (monitor, source)
}

#[test]
fn nearby_event_notifies_exactly_once() {
    let (monitor, source) = monitor_with_source(MonitorConfig::default());

    let catalog_json = r#"[
        {"id": 1, "title": "Cleanup", "latitude": 28.6139, "longitude": 77.2090,
         "location": "Connaught Place", "category": "environment"}
    ]"#;
    let records: Vec<RawEvent> = serde_json::from_str(catalog_json).unwrap();
    let stream = monitor.init(records).unwrap();
    assert_eq!(monitor.active_events(), 1);

    assert!(source.push(sample(28.6150, 77.2100)));

    let notification = stream.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(notification.event.id, EventId::from(1));
    assert_eq!(notification.event.title, "Cleanup");
    assert_eq!(notification.event.address.as_deref(), Some("Connaught Place"));
    assert!(
        (150.0..165.0).contains(&notification.distance_meters),
        "got {}",
        notification.distance_meters
    );
    assert_eq!(notification.distance_km, 0.2);
    assert_eq!(notification.detail_route(), "/events/1");

    // The same position again: suppressed by the notified set.
    assert!(source.push(sample(28.6150, 77.2100)));
    let err = stream.recv_timeout(Duration::from_millis(250)).unwrap_err();
    assert!(
        matches!(err, GeofenceError::RecvTimeout { .. }),
        "expected no second notification, got {err:?}"
    );
}

#[test]
fn radius_boundary_is_inclusive() {
    let (monitor, source) = monitor_with_source(MonitorConfig::default());
    let stream = monitor.init(vec![record(1, 0.0, 0.0, "Boundary")]).unwrap();

    // 5001 m away: outside the default 5000 m geofence.
    assert!(source.push(sample(latitude_at_meters(5_001.0), 0.0)));
    // 4999 m away: inside.
    assert!(source.push(sample(latitude_at_meters(4_999.0), 0.0)));

    let notification = stream.recv_timeout(Duration::from_secs(1)).unwrap();
    assert!(
        (notification.distance_meters - 4_999.0).abs() < 0.5,
        "the outside sample must not fire; got distance {}",
        notification.distance_meters
    );
    assert!(stream.try_recv().unwrap().is_none());
}

#[test]
fn malformed_events_are_excluded_from_monitoring() {
    let (monitor, source) = monitor_with_source(MonitorConfig::default());

    let catalog_json = r#"[
        {"id": 1, "title": "Good", "latitude": 0.0, "longitude": 0.0},
        {"id": 2, "title": "Bad", "latitude": "not-a-number", "longitude": 10},
        {"id": 3, "title": "Missing"}
    ]"#;
    let records: Vec<RawEvent> = serde_json::from_str(catalog_json).unwrap();
    let stream = monitor.init(records).unwrap();

    assert_eq!(monitor.active_events(), 1);
    assert_eq!(monitor.excluded_events(), 2);

    assert!(source.push(sample(0.0, 0.0)));
    let notification = stream.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(notification.event.id, EventId::from(1));
}

#[test]
fn stop_watching_silences_late_deliveries() {
    let (monitor, source) = monitor_with_source(MonitorConfig::default());
    let stream = monitor.init(vec![record(1, 0.0, 0.0, "A")]).unwrap();

    monitor.stop_watching();
    assert_eq!(monitor.state(), MonitorState::Stopped);
    assert!(!source.is_watched());

    // A late-arriving callback cannot reach the monitor anymore.
    assert!(!source.push(sample(0.0, 0.0)));

    // No notifications were pending, and the generation's stream ends.
    let err = stream.recv().unwrap_err();
    assert!(matches!(err, GeofenceError::Disconnected { .. }));
    assert_eq!(monitor.dropped_notifications(), 0);
}

#[test]
fn stopped_monitor_resumes_only_through_init() {
    let (monitor, source) = monitor_with_source(MonitorConfig::default());
    let _stream = monitor.init(vec![record(1, 0.0, 0.0, "A")]).unwrap();

    monitor.stop_watching();
    let err = monitor.start_watching().unwrap_err();
    assert!(matches!(err, GeofenceError::MonitorStopped));

    // A fresh catalog load restarts the watch with a clean slate.
    let stream = monitor.init(vec![record(1, 0.0, 0.0, "A")]).unwrap();
    assert_eq!(monitor.state(), MonitorState::Watching);

    assert!(source.push(sample(0.0, 0.0)));
    let notification = stream.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(notification.event.id, EventId::from(1));
}

#[test]
fn position_failures_do_not_stop_the_watch() {
    let (monitor, source) = monitor_with_source(MonitorConfig::default());
    let stream = monitor.init(vec![record(1, 0.0, 0.0, "A")]).unwrap();

    assert!(source.fail(PositionError::AcquisitionTimeout { duration_ms: 27_000 }));
    assert!(source.fail(PositionError::Unavailable {
        message: "no fix".to_string(),
    }));

    assert!(source.push(sample(0.0, 0.0)));
    stream.recv_timeout(Duration::from_secs(1)).unwrap();

    assert_eq!(monitor.state(), MonitorState::Watching);
    assert_eq!(monitor.position_failures(), 2);
}

#[test]
fn slow_consumer_drops_notifications_instead_of_blocking() {
    let cfg = MonitorConfig {
        notification_capacity: 1,
        ..MonitorConfig::default()
    };
    let (monitor, source) = monitor_with_source(cfg);

    // Many events around the same point so a single sample fires a burst.
    let records: Vec<RawEvent> = (1..=64)
        .map(|id| record(id, 0.0, 0.0, &format!("event-{id}")))
        .collect();
    let stream = monitor.init(records).unwrap();

    // Intentionally do not read from the stream to force backpressure.
    assert!(source.push(sample(0.0, 0.0)));

    let mut dropped = 0;
    for _ in 0..50 {
        dropped = monitor.dropped_notifications();
        if dropped > 0 {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(dropped > 0, "expected drops under backpressure");

    // The one buffered notification is still deliverable.
    let _keep = stream.recv_timeout(Duration::from_secs(1)).unwrap();
}

#[test]
fn reinit_supersedes_the_previous_stream() {
    let (monitor, source) = monitor_with_source(MonitorConfig::default());
    let first = monitor.init(vec![record(1, 0.0, 0.0, "A")]).unwrap();

    assert!(source.push(sample(0.0, 0.0)));
    first.recv_timeout(Duration::from_secs(1)).unwrap();

    let second = monitor.init(vec![record(1, 0.0, 0.0, "A")]).unwrap();

    let err = first.recv().unwrap_err();
    assert!(matches!(err, GeofenceError::Disconnected { .. }));

    // The notified set was cleared with the reload.
    assert!(source.push(sample(0.0, 0.0)));
    let notification = second.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(notification.event.id, EventId::from(1));
}
