//! Per-query one-shot timeouts.

use std::time::Duration;

use tokio::sync::oneshot;

/// Cancellation handle for an armed timer. Dropping it cancels the timer
/// without firing.
#[derive(Debug)]
pub(crate) struct TimeoutGuard {
    _cancel: oneshot::Sender<()>,
}

/// Arm a one-shot timer. `on_fire` runs once when the deadline passes,
/// unless the returned guard is dropped first.
pub(crate) fn arm<F>(duration: Duration, on_fire: F) -> TimeoutGuard
where
    F: FnOnce() + Send + 'static,
{
    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(duration) => on_fire(),
            _ = cancel_rx => {}
        }
    });

    TimeoutGuard { _cancel: cancel_tx }
}
