//! Position-source boundary types.
//!
//! A position source is the external capability that produces location
//! fixes. The monitor subscribes with a [`PositionSink`]; the source pushes
//! [`PositionSample`]s and [`PositionError`]s through the sink until the
//! returned [`WatchHandle`] is cancelled or dropped. Delivery into the
//! monitor is non-blocking: a source is never stalled by a slow consumer.
//!
//! [`ManualPositionSource`] is the in-process implementation used by the
//! test suite and by hosts that bridge a platform geolocation API by hand.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Sender, TrySendError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GeofenceResult, PositionError};
use crate::geo::Coordinate;

/// Maximum age of a cached fix a source may reuse instead of forcing a
/// fresh acquisition.
pub const DEFAULT_MAXIMUM_AGE: Duration = Duration::from_millis(30_000);

/// How long a source waits for a fix before reporting
/// [`PositionError::AcquisitionTimeout`].
pub const DEFAULT_ACQUISITION_TIMEOUT: Duration = Duration::from_millis(27_000);

/// Options passed to a position source when subscribing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchOptions {
    /// Request high-accuracy readings.
    pub high_accuracy: bool,
    /// A cached fix no older than this may be reused.
    pub maximum_age: Duration,
    /// Acquisition timeout; exceeding it reports a non-fatal failure on
    /// the error path and the watch continues.
    pub timeout: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            maximum_age: DEFAULT_MAXIMUM_AGE,
            timeout: DEFAULT_ACQUISITION_TIMEOUT,
        }
    }
}

/// A position fix with its arrival timestamp.
///
/// Arrival order is the only ordering the monitor relies on; there is no
/// explicit sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    /// Where the fix places the user.
    pub coordinate: Coordinate,
    /// When the sample arrived.
    pub received_at: DateTime<Utc>,
}

impl PositionSample {
    /// Creates a sample stamped with the current time.
    #[must_use]
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            received_at: Utc::now(),
        }
    }

    /// Creates a sample with an explicit arrival timestamp.
    #[must_use]
    pub const fn at(coordinate: Coordinate, received_at: DateTime<Utc>) -> Self {
        Self {
            coordinate,
            received_at,
        }
    }
}

/// Unique identifier for one watch subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchId(Uuid);

impl WatchId {
    /// Create a new random watch id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for WatchId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub(crate) enum SampleMsg {
    Sample {
        watch: WatchId,
        sample: PositionSample,
    },
    Failure {
        watch: WatchId,
        error: PositionError,
    },
}

/// Delivery handle a position source pushes into.
///
/// Every delivery is tagged with the watch id the sink was created for,
/// so samples from a cancelled watch are discarded even if the source
/// keeps pushing. Pushes are non-blocking; overflow is counted, never
/// waited on.
#[derive(Debug, Clone)]
pub struct PositionSink {
    watch: WatchId,
    active: Arc<AtomicBool>,
    tx: Sender<SampleMsg>,
    dropped: Arc<AtomicU64>,
}

impl PositionSink {
    pub(crate) fn new(
        watch: WatchId,
        active: Arc<AtomicBool>,
        tx: Sender<SampleMsg>,
        dropped: Arc<AtomicU64>,
    ) -> Self {
        Self {
            watch,
            active,
            tx,
            dropped,
        }
    }

    /// The watch this sink delivers for.
    #[must_use]
    pub const fn watch_id(&self) -> WatchId {
        self.watch
    }

    /// Delivers a position sample to the monitor.
    ///
    /// Returns true if the sample was queued. Delivery after the watch
    /// was stopped is a no-op returning false.
    pub fn push(&self, sample: PositionSample) -> bool {
        if !self.active.load(Ordering::Acquire) {
            return false;
        }
        self.send(SampleMsg::Sample {
            watch: self.watch,
            sample,
        })
    }

    /// Reports a position-acquisition failure to the monitor.
    ///
    /// Failures are diagnostic only: they never stop the watch.
    pub fn report_error(&self, error: PositionError) -> bool {
        if !self.active.load(Ordering::Acquire) {
            return false;
        }
        self.send(SampleMsg::Failure {
            watch: self.watch,
            error,
        })
    }

    fn send(&self, msg: SampleMsg) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

/// Handle owning one active watch subscription.
///
/// Cancelling (or dropping) the handle releases the subscription on the
/// source side; a leaked handle would keep the source acquiring fixes
/// indefinitely.
pub struct WatchHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl WatchHandle {
    /// Wraps the source-side cancellation action.
    #[must_use]
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Releases the subscription. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("cancelled", &self.cancel.is_none())
            .finish()
    }
}

/// Capability to watch a stream of position fixes.
///
/// `subscribe` starts a continuous watch (not a one-shot read) honoring
/// the given options, delivering through the sink until the returned
/// handle is cancelled. Retry and backoff policy for failed fixes belongs
/// to the source, not to its consumers.
pub trait PositionSource: Send + Sync {
    /// Starts a continuous watch.
    ///
    /// # Errors
    ///
    /// Returns [`PositionError::WatchUnsupported`] (wrapped) if the
    /// source cannot watch continuously, or another position error if the
    /// subscription itself fails.
    fn subscribe(&self, sink: PositionSink, options: &WatchOptions) -> GeofenceResult<WatchHandle>;
}

#[derive(Debug, Default)]
struct ManualWatch {
    sink: Option<PositionSink>,
    options: Option<WatchOptions>,
}

/// A scriptable in-process position source.
///
/// Hosts push samples and failures by hand; whatever watch is currently
/// subscribed receives them. Useful in tests and wherever a platform
/// geolocation callback is bridged into the engine manually.
///
/// # Examples
///
/// ```
/// use geofence::{Coordinate, ManualPositionSource, PositionSample};
///
/// let source = ManualPositionSource::new();
/// assert!(!source.is_watched());
///
/// // Without a subscriber the push is dropped.
/// let sample = PositionSample::new(Coordinate::new(0.0, 0.0).unwrap());
/// assert!(!source.push(sample));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualPositionSource {
    shared: Arc<Mutex<ManualWatch>>,
}

impl ManualPositionSource {
    /// Creates a source with no active watch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a sample to the active watch, if any.
    ///
    /// Returns true if a watch was subscribed and accepted the sample.
    pub fn push(&self, sample: PositionSample) -> bool {
        let shared = self.shared.lock().expect("manual source lock poisoned");
        shared.sink.as_ref().is_some_and(|sink| sink.push(sample))
    }

    /// Reports an acquisition failure to the active watch, if any.
    pub fn fail(&self, error: PositionError) -> bool {
        let shared = self.shared.lock().expect("manual source lock poisoned");
        shared
            .sink
            .as_ref()
            .is_some_and(|sink| sink.report_error(error))
    }

    /// True while a watch is subscribed.
    #[must_use]
    pub fn is_watched(&self) -> bool {
        let shared = self.shared.lock().expect("manual source lock poisoned");
        shared.sink.is_some()
    }

    /// The options the current (or most recent) watch subscribed with.
    #[must_use]
    pub fn watch_options(&self) -> Option<WatchOptions> {
        let shared = self.shared.lock().expect("manual source lock poisoned");
        shared.options.clone()
    }
}

impl PositionSource for ManualPositionSource {
    fn subscribe(&self, sink: PositionSink, options: &WatchOptions) -> GeofenceResult<WatchHandle> {
        let watch = sink.watch_id();
        {
            let mut shared = self.shared.lock().expect("manual source lock poisoned");
            shared.sink = Some(sink);
            shared.options = Some(options.clone());
        }

        let slot = Arc::clone(&self.shared);
        Ok(WatchHandle::new(move || {
            if let Ok(mut shared) = slot.lock() {
                // Only clear the slot if it still belongs to this watch;
                // a newer subscription may have replaced it.
                if shared.sink.as_ref().map(PositionSink::watch_id) == Some(watch) {
                    shared.sink = None;
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    fn sink_with_rx(capacity: usize) -> (PositionSink, crossbeam_channel::Receiver<SampleMsg>, Arc<AtomicU64>) {
        let (tx, rx) = bounded(capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        let sink = PositionSink::new(
            WatchId::new(),
            Arc::new(AtomicBool::new(true)),
            tx,
            Arc::clone(&dropped),
        );
        (sink, rx, dropped)
    }

    fn sample() -> PositionSample {
        PositionSample::new(Coordinate::new(28.6139, 77.2090).unwrap())
    }

    #[test]
    fn watch_options_defaults() {
        let options = WatchOptions::default();
        assert!(options.high_accuracy);
        assert_eq!(options.maximum_age, Duration::from_millis(30_000));
        assert_eq!(options.timeout, Duration::from_millis(27_000));
    }

    #[test]
    fn sink_delivers_tagged_samples() {
        let (sink, rx, _) = sink_with_rx(4);
        assert!(sink.push(sample()));

        let SampleMsg::Sample { watch, .. } = rx.try_recv().unwrap() else {
            panic!("expected a sample message");
        };
        assert_eq!(watch, sink.watch_id());
    }

    #[test]
    fn inactive_sink_is_a_no_op() {
        let (tx, rx) = bounded(4);
        let sink = PositionSink::new(
            WatchId::new(),
            Arc::new(AtomicBool::new(false)),
            tx,
            Arc::new(AtomicU64::new(0)),
        );
        assert!(!sink.push(sample()));
        assert!(!sink.report_error(PositionError::PermissionDenied));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn full_queue_counts_drops() {
        let (sink, _rx, dropped) = sink_with_rx(1);
        assert!(sink.push(sample()));
        assert!(!sink.push(sample()));
        assert_eq!(dropped.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn manual_source_round_trip() {
        let source = ManualPositionSource::new();
        let (sink, rx, _) = sink_with_rx(4);

        let mut handle = source.subscribe(sink, &WatchOptions::default()).unwrap();
        assert!(source.is_watched());
        assert!(source.watch_options().is_some());

        assert!(source.push(sample()));
        assert!(source.fail(PositionError::AcquisitionTimeout { duration_ms: 27_000 }));
        assert_eq!(rx.len(), 2);

        handle.cancel();
        assert!(!source.is_watched());
        assert!(!source.push(sample()));
    }

    #[test]
    fn stale_handle_does_not_cancel_newer_watch() {
        let source = ManualPositionSource::new();
        let (first_sink, _rx1, _) = sink_with_rx(4);
        let (second_sink, rx2, _) = sink_with_rx(4);

        let mut first = source.subscribe(first_sink, &WatchOptions::default()).unwrap();
        let _second = source.subscribe(second_sink, &WatchOptions::default()).unwrap();

        // Cancelling the superseded watch must leave the new one alone.
        first.cancel();
        assert!(source.is_watched());
        assert!(source.push(sample()));
        assert_eq!(rx2.len(), 1);
    }

    #[test]
    fn dropping_handle_cancels_watch() {
        let source = ManualPositionSource::new();
        let (sink, _rx, _) = sink_with_rx(4);
        {
            let _handle = source.subscribe(sink, &WatchOptions::default()).unwrap();
            assert!(source.is_watched());
        }
        assert!(!source.is_watched());
    }
}
