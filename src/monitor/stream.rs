//! Consumer handle for emitted notifications.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::error::{GeofenceError, GeofenceResult};
use crate::position::WatchId;

use super::notification::Notification;

/// The stream of notifications for one catalog generation.
///
/// Returned by [`ProximityMonitor::init`](super::ProximityMonitor::init);
/// the presentation layer drains it. The buffer is bounded: if the
/// consumer falls behind, the monitor drops notifications rather than
/// blocking, and counts the drops. The stream disconnects when the
/// monitor is stopped or a newer catalog is loaded.
#[derive(Debug)]
pub struct NotificationStream {
    watch: WatchId,
    rx: Receiver<Notification>,
}

impl NotificationStream {
    pub(crate) fn new(watch: WatchId, rx: Receiver<Notification>) -> Self {
        Self { watch, rx }
    }

    /// The watch subscription backing this stream.
    #[must_use]
    pub const fn watch_id(&self) -> WatchId {
        self.watch
    }

    /// Receives the next notification (blocking).
    ///
    /// # Errors
    ///
    /// Returns [`GeofenceError::Disconnected`] once the generation ends.
    pub fn recv(&self) -> GeofenceResult<Notification> {
        self.rx.recv().map_err(|_| GeofenceError::Disconnected {
            channel: "notifications",
        })
    }

    /// Receives the next notification with a timeout.
    ///
    /// # Errors
    ///
    /// Returns [`GeofenceError::RecvTimeout`] if nothing arrived in time,
    /// or [`GeofenceError::Disconnected`] once the generation ends.
    pub fn recv_timeout(&self, timeout: Duration) -> GeofenceResult<Notification> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => GeofenceError::RecvTimeout {
                duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            },
            RecvTimeoutError::Disconnected => GeofenceError::Disconnected {
                channel: "notifications",
            },
        })
    }

    /// Receives a pending notification without blocking.
    ///
    /// Returns `Ok(None)` when the buffer is currently empty.
    ///
    /// # Errors
    ///
    /// Returns [`GeofenceError::Disconnected`] once the generation ends.
    pub fn try_recv(&self) -> GeofenceResult<Option<Notification>> {
        match self.rx.try_recv() {
            Ok(notification) => Ok(Some(notification)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(GeofenceError::Disconnected {
                channel: "notifications",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EventId, GeoEvent};
    use crate::geo::Coordinate;
    use crossbeam_channel::bounded;

    fn notification() -> Notification {
        Notification::new(
            GeoEvent::new(
                EventId::from(1),
                Coordinate::new(0.0, 0.0).unwrap(),
                "event",
            ),
            100.0,
        )
    }

    #[test]
    fn try_recv_distinguishes_empty_from_disconnected() {
        let (tx, rx) = bounded(4);
        let stream = NotificationStream::new(WatchId::new(), rx);

        assert!(matches!(stream.try_recv(), Ok(None)));

        tx.send(notification()).unwrap();
        assert!(matches!(stream.try_recv(), Ok(Some(_))));

        drop(tx);
        let err = stream.try_recv().unwrap_err();
        assert!(matches!(err, GeofenceError::Disconnected { .. }));
    }

    #[test]
    fn recv_timeout_reports_timeout() {
        let (_tx, rx) = bounded::<Notification>(1);
        let stream = NotificationStream::new(WatchId::new(), rx);

        let err = stream.recv_timeout(Duration::from_millis(10)).unwrap_err();
        let GeofenceError::RecvTimeout { duration_ms } = err else {
            panic!("expected timeout, got {err:?}");
        };
        assert_eq!(duration_ms, 10);
    }

    #[test]
    fn recv_reports_disconnected_when_sender_dropped() {
        let (tx, rx) = bounded::<Notification>(1);
        let stream = NotificationStream::new(WatchId::new(), rx);
        drop(tx);

        let err = stream.recv().unwrap_err();
        assert!(matches!(
            err,
            GeofenceError::Disconnected {
                channel: "notifications"
            }
        ));
    }
}
