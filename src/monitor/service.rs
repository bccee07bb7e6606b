//! The proximity monitor service.
//!
//! A [`ProximityMonitor`] owns one subscription to a position source, the
//! normalized event catalog, and the set of already-notified events. It
//! runs a dedicated worker thread; samples and control messages arrive on
//! bounded channels and the worker processes them to completion one at a
//! time, so catalog and notified-set state needs no locking.

use std::collections::HashSet;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use log::{debug, warn};

use crate::catalog::{normalize_events, EventId, GeoEvent, RawEvent};
use crate::error::{GeofenceError, GeofenceResult, ValidationError};
use crate::position::{
    PositionSample, PositionSink, PositionSource, SampleMsg, WatchHandle, WatchId, WatchOptions,
};

use super::evaluate::sweep_catalog;
use super::notification::Notification;
use super::stream::NotificationStream;

/// Geofence radius applied when none is configured explicitly, in meters.
pub const DEFAULT_GEOFENCE_RADIUS_METERS: f64 = 5_000.0;

const CONTROL_QUEUE_CAPACITY: usize = 64;

#[allow(missing_docs)]
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Radius of every event's geofence, in meters. One scalar shared by
    /// the whole catalog, not a per-event attribute.
    pub geofence_radius_meters: f64,
    /// Options forwarded to the position source when subscribing.
    pub watch: WatchOptions,
    /// Max queued position samples before new ones are dropped.
    pub sample_queue_capacity: usize,
    /// Per-generation notification buffer capacity.
    pub notification_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            geofence_radius_meters: DEFAULT_GEOFENCE_RADIUS_METERS,
            watch: WatchOptions::default(),
            sample_queue_capacity: 256,
            notification_capacity: 64,
        }
    }
}

impl MonitorConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if !self.geofence_radius_meters.is_finite() || self.geofence_radius_meters <= 0.0 {
            return Err(ValidationError::InvalidRadius {
                value: self.geofence_radius_meters,
            });
        }
        Ok(())
    }
}

/// Lifecycle of a monitor instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Constructed, not watching.
    Idle,
    /// Subscribed to the position source.
    Watching,
    /// Subscription released; only a new catalog load resumes watching.
    Stopped,
}

enum ControlMsg {
    Load {
        watch: WatchId,
        catalog: Arc<Vec<GeoEvent>>,
        notifications: Sender<Notification>,
        reply: Sender<GeofenceResult<()>>,
    },
    Begin {
        watch: WatchId,
    },
    Invalidate,
}

struct WatchState {
    lifecycle: MonitorState,
    handle: Option<WatchHandle>,
    watch: Option<WatchId>,
    active: Option<Arc<AtomicBool>>,
}

impl WatchState {
    /// Deactivates the sink and cancels the source subscription. Late
    /// deliveries through an already-handed-out sink become no-ops.
    fn release(&mut self) {
        if let Some(active) = self.active.take() {
            active.store(false, Ordering::Release);
        }
        if let Some(mut handle) = self.handle.take() {
            handle.cancel();
        }
        self.watch = None;
    }
}

/// Stateful service correlating position samples against a catalog of
/// geotagged events.
///
/// Each instance is independent: configuration and the position-source
/// capability are injected at construction, so multiple monitors (e.g.,
/// in tests) never share state. The first time a sample lands within an
/// event's geofence, exactly one [`Notification`] is emitted for that
/// event; the suppression lasts until the next catalog load.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use geofence::{
///     Coordinate, ManualPositionSource, MonitorConfig, PositionSample,
///     ProximityMonitor, RawEvent,
/// };
///
/// let source = ManualPositionSource::new();
/// let monitor =
///     ProximityMonitor::new(MonitorConfig::default(), Arc::new(source.clone())).unwrap();
///
/// let records: Vec<RawEvent> = serde_json::from_str(
///     r#"[{"id": 1, "title": "Cleanup", "latitude": 28.6139, "longitude": 77.2090}]"#,
/// ).unwrap();
/// let stream = monitor.init(records).unwrap();
///
/// source.push(PositionSample::new(Coordinate::new(28.6150, 77.2100).unwrap()));
/// let notification = stream.recv().unwrap();
/// assert_eq!(notification.distance_km, 0.2);
/// ```
pub struct ProximityMonitor {
    cfg: MonitorConfig,
    source: Arc<dyn PositionSource>,
    control_tx: Sender<ControlMsg>,
    sample_tx: Sender<SampleMsg>,
    dropped_samples: Arc<AtomicU64>,
    dropped_notifications: Arc<AtomicU64>,
    position_failures: Arc<AtomicU64>,
    active_events: AtomicUsize,
    excluded_events: AtomicUsize,
    watch: Mutex<WatchState>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ProximityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProximityMonitor")
            .field("cfg", &self.cfg)
            .field("active_events", &self.active_events)
            .field("excluded_events", &self.excluded_events)
            .finish_non_exhaustive()
    }
}

impl ProximityMonitor {
    /// Creates a monitor in the Idle state.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidRadius`] (wrapped) for a
    /// non-finite or non-positive geofence radius.
    pub fn new(cfg: MonitorConfig, source: Arc<dyn PositionSource>) -> GeofenceResult<Self> {
        cfg.validate()?;

        let (control_tx, control_rx) = bounded::<ControlMsg>(CONTROL_QUEUE_CAPACITY);
        let (sample_tx, sample_rx) = bounded::<SampleMsg>(cfg.sample_queue_capacity.max(1));

        let dropped_notifications = Arc::new(AtomicU64::new(0));
        let position_failures = Arc::new(AtomicU64::new(0));

        let radius_meters = cfg.geofence_radius_meters;
        let worker_dropped = Arc::clone(&dropped_notifications);
        let worker_failures = Arc::clone(&position_failures);
        let join = thread::Builder::new()
            .name("geofence-monitor".to_string())
            .spawn(move || {
                worker_loop(
                    radius_meters,
                    &worker_dropped,
                    &worker_failures,
                    &control_rx,
                    &sample_rx,
                )
            })
            .expect("failed to spawn geofence monitor worker");

        Ok(Self {
            cfg,
            source,
            control_tx,
            sample_tx,
            dropped_samples: Arc::new(AtomicU64::new(0)),
            dropped_notifications,
            position_failures,
            active_events: AtomicUsize::new(0),
            excluded_events: AtomicUsize::new(0),
            watch: Mutex::new(WatchState {
                lifecycle: MonitorState::Idle,
                handle: None,
                watch: None,
                active: None,
            }),
            join: Mutex::new(Some(join)),
        })
    }

    /// Loads a catalog and starts (or keeps) watching.
    ///
    /// Supplier records are normalized here, at the ingestion boundary:
    /// entries without usable coordinates are excluded from monitoring
    /// and logged, never fatal. The notified set is cleared, so every
    /// event is eligible to fire again. If a watch is already running it
    /// is reused; otherwise a new subscription is opened.
    ///
    /// Returns the notification stream for this catalog generation. A
    /// stream from an earlier `init` disconnects.
    ///
    /// # Errors
    ///
    /// Returns a position error if subscribing to the source fails, or
    /// [`GeofenceError::Disconnected`] if the worker is gone.
    pub fn init(&self, events: Vec<RawEvent>) -> GeofenceResult<NotificationStream> {
        let catalog = normalize_events(events);
        debug!(
            "catalog load: {} events active, {} excluded",
            catalog.events.len(),
            catalog.excluded
        );

        let mut watch = self.lock_watch();
        self.active_events.store(catalog.events.len(), Ordering::Relaxed);
        self.excluded_events.store(catalog.excluded, Ordering::Relaxed);

        // Keep a live subscription across catalog reloads; everything
        // else gets a fresh watch id below.
        let watch_id = match (watch.lifecycle, watch.watch) {
            (MonitorState::Watching, Some(id)) => id,
            _ => WatchId::new(),
        };

        let (notif_tx, notif_rx) = bounded(self.cfg.notification_capacity.max(1));
        let (reply_tx, reply_rx) = bounded(1);
        self.control_tx
            .send(ControlMsg::Load {
                watch: watch_id,
                catalog: Arc::new(catalog.events),
                notifications: notif_tx,
                reply: reply_tx,
            })
            .map_err(|_| GeofenceError::Disconnected {
                channel: "monitor control",
            })?;

        // Wait for the worker to install the catalog before subscribing,
        // so no sample can race ahead of its own generation.
        reply_rx.recv().map_err(|_| GeofenceError::Disconnected {
            channel: "monitor control",
        })??;
        watch.watch = Some(watch_id);

        if watch.lifecycle != MonitorState::Watching {
            self.subscribe_locked(&mut watch, watch_id)?;
        }

        Ok(NotificationStream::new(watch_id, notif_rx))
    }

    /// Starts watching without touching the catalog.
    ///
    /// Idempotent while Watching. From Idle this opens a subscription
    /// (with an empty catalog if none was loaded yet).
    ///
    /// # Errors
    ///
    /// Returns [`GeofenceError::MonitorStopped`] from the Stopped state;
    /// a stopped monitor resumes only through [`init`](Self::init).
    pub fn start_watching(&self) -> GeofenceResult<()> {
        let mut watch = self.lock_watch();
        match watch.lifecycle {
            MonitorState::Watching => Ok(()),
            MonitorState::Stopped => Err(GeofenceError::MonitorStopped),
            MonitorState::Idle => {
                let watch_id = match watch.watch {
                    Some(id) => id,
                    None => {
                        let id = WatchId::new();
                        self.control_tx
                            .send(ControlMsg::Begin { watch: id })
                            .map_err(|_| GeofenceError::Disconnected {
                                channel: "monitor control",
                            })?;
                        watch.watch = Some(id);
                        id
                    }
                };
                self.subscribe_locked(&mut watch, watch_id)
            }
        }
    }

    /// Stops watching and releases the subscription. Idempotent; safe
    /// from any state.
    ///
    /// The current generation is discarded: a sample already in flight
    /// finishes evaluating, but anything arriving afterwards is ignored,
    /// and the generation's notification stream disconnects.
    pub fn stop_watching(&self) {
        let mut watch = self.lock_watch();
        if watch.lifecycle == MonitorState::Stopped {
            return;
        }
        watch.release();
        watch.lifecycle = MonitorState::Stopped;

        // Best-effort: if the worker is already gone there is nothing to
        // invalidate.
        let _ = self.control_tx.send(ControlMsg::Invalidate);
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> MonitorState {
        self.lock_watch().lifecycle
    }

    /// Number of catalog events being monitored (catalog size minus
    /// excluded records).
    #[must_use]
    pub fn active_events(&self) -> usize {
        self.active_events.load(Ordering::Relaxed)
    }

    /// Number of records the last catalog load excluded as malformed.
    #[must_use]
    pub fn excluded_events(&self) -> usize {
        self.excluded_events.load(Ordering::Relaxed)
    }

    /// Position samples dropped because the sample queue was full.
    #[must_use]
    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples.load(Ordering::Relaxed)
    }

    /// Notifications dropped because the consumer fell behind or went
    /// away.
    #[must_use]
    pub fn dropped_notifications(&self) -> u64 {
        self.dropped_notifications.load(Ordering::Relaxed)
    }

    /// Position-acquisition failures reported by the source. Failures
    /// never change the watch state; the monitor waits for the next
    /// sample.
    #[must_use]
    pub fn position_failures(&self) -> u64 {
        self.position_failures.load(Ordering::Relaxed)
    }

    /// The monitor's configuration.
    #[must_use]
    pub const fn config(&self) -> &MonitorConfig {
        &self.cfg
    }

    fn subscribe_locked(
        &self,
        watch: &mut WatchState,
        watch_id: WatchId,
    ) -> GeofenceResult<()> {
        let active = Arc::new(AtomicBool::new(true));
        let sink = PositionSink::new(
            watch_id,
            Arc::clone(&active),
            self.sample_tx.clone(),
            Arc::clone(&self.dropped_samples),
        );
        let handle = self.source.subscribe(sink, &self.cfg.watch)?;
        watch.handle = Some(handle);
        watch.active = Some(active);
        watch.watch = Some(watch_id);
        watch.lifecycle = MonitorState::Watching;
        Ok(())
    }

    fn lock_watch(&self) -> std::sync::MutexGuard<'_, WatchState> {
        self.watch.lock().expect("monitor state lock poisoned")
    }
}

impl Drop for ProximityMonitor {
    fn drop(&mut self) {
        // Release the subscription first: a leaked watch would keep the
        // position source acquiring fixes indefinitely.
        if let Ok(mut watch) = self.watch.lock() {
            watch.release();
        }

        // Close our channel ends so the worker can exit, then detach.
        // A sink held by an external source may outlive us and keep the
        // sample sender alive, so joining here could block; the worker
        // exits as soon as it sees the control channel close.
        let (dummy_control, _) = bounded::<ControlMsg>(1);
        drop(mem::replace(&mut self.control_tx, dummy_control));
        let (dummy_samples, _) = bounded::<SampleMsg>(1);
        drop(mem::replace(&mut self.sample_tx, dummy_samples));

        if let Ok(mut guard) = self.join.lock() {
            drop(guard.take());
        }
    }
}

struct ActiveWatch {
    watch: WatchId,
    catalog: Arc<Vec<GeoEvent>>,
    notified: HashSet<EventId>,
    notifications: Option<Sender<Notification>>,
}

fn worker_loop(
    radius_meters: f64,
    dropped_notifications: &AtomicU64,
    position_failures: &AtomicU64,
    control_rx: &Receiver<ControlMsg>,
    sample_rx: &Receiver<SampleMsg>,
) {
    let mut current: Option<ActiveWatch> = None;

    loop {
        select! {
            recv(control_rx) -> msg => {
                match msg {
                    Ok(ControlMsg::Load { watch, catalog, notifications, reply }) => {
                        current = Some(ActiveWatch {
                            watch,
                            catalog,
                            notified: HashSet::new(),
                            notifications: Some(notifications),
                        });
                        let _ = reply.send(Ok(()));
                    }
                    Ok(ControlMsg::Begin { watch }) => {
                        current = Some(ActiveWatch {
                            watch,
                            catalog: Arc::new(Vec::new()),
                            notified: HashSet::new(),
                            notifications: None,
                        });
                    }
                    Ok(ControlMsg::Invalidate) => {
                        current = None;
                    }
                    // The monitor handle is gone; no one can consume
                    // results, so exit even if sinks are still alive.
                    Err(_) => break,
                }
            }
            recv(sample_rx) -> msg => {
                match msg {
                    Ok(SampleMsg::Sample { watch, sample }) => {
                        // Samples from a cancelled watch are discarded.
                        if let Some(active) = current.as_mut() {
                            if active.watch == watch {
                                evaluate_sample(active, radius_meters, &sample, dropped_notifications);
                            }
                        }
                    }
                    Ok(SampleMsg::Failure { watch, error }) => {
                        if current.as_ref().map(|active| active.watch) == Some(watch) {
                            warn!("position source failure: {error}");
                            position_failures.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Err(_) => break,
                }
            }
        }
    }
}

fn evaluate_sample(
    active: &mut ActiveWatch,
    radius_meters: f64,
    sample: &PositionSample,
    dropped_notifications: &AtomicU64,
) {
    let fired = sweep_catalog(&active.catalog, &mut active.notified, radius_meters, sample);
    if fired.is_empty() {
        return;
    }

    match active.notifications.as_ref() {
        Some(tx) => {
            for notification in fired {
                // Never block the worker: drop if the consumer is slow
                // or gone.
                match tx.try_send(notification) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                        dropped_notifications.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
        None => {
            dropped_notifications.fetch_add(fired.len() as u64, Ordering::Relaxed);
        }
    }
}
