//! The pending-query slot and the single-shot completion latch.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::{oneshot, watch};

use crate::error::Result;
use crate::resultset::QueryResult;

use super::timeout::TimeoutGuard;

/// The completion handle of an in-flight query, together with the timer
/// guarding it. Dropping the guard cancels the timer, so completing the
/// in-flight entry disarms the timeout as a side effect.
#[derive(Debug)]
pub(crate) struct InFlight {
    tx: oneshot::Sender<Result<QueryResult>>,
    _timeout: Option<TimeoutGuard>,
}

impl InFlight {
    pub fn new(tx: oneshot::Sender<Result<QueryResult>>, timeout: Option<TimeoutGuard>) -> Self {
        Self {
            tx,
            _timeout: timeout,
        }
    }

    /// Deliver the query outcome. The caller may have dropped its future;
    /// that is not an error.
    pub fn complete(self, result: Result<QueryResult>) {
        let _ = self.tx.send(result);
    }
}

/// A single-place register for the in-flight query.
///
/// Invariant: at most one value present. `install` is the compare-and-set
/// of the contract; a failed install is a programmer error surfaced as
/// `StillRunningQuery`, never a retry condition.
#[derive(Debug, Default)]
pub(crate) struct PendingSlot {
    slot: Mutex<Option<InFlight>>,
}

impl PendingSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<InFlight>> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Install a new in-flight query; hands the entry back if the slot is
    /// occupied.
    pub fn install(&self, inflight: InFlight) -> core::result::Result<(), InFlight> {
        let mut slot = self.lock();
        if slot.is_some() {
            return Err(inflight);
        }
        *slot = Some(inflight);
        Ok(())
    }

    /// Empty the slot, returning the entry if one was present.
    pub fn take(&self) -> Option<InFlight> {
        self.lock().take()
    }

    pub fn is_occupied(&self) -> bool {
        self.lock().is_some()
    }
}

/// A single-shot, multi-waiter completion latch.
///
/// Both the connect and the disconnect future complete exactly once;
/// racing completions are silently ignored and later waiters observe the
/// first value.
#[derive(Debug)]
pub(crate) struct Completion<T: Clone> {
    tx: watch::Sender<Option<T>>,
}

impl<T: Clone> Completion<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Complete the latch. Returns `false` when it was already complete.
    pub fn complete(&self, value: T) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(value);
            true
        })
    }

    pub async fn wait(&self) -> T {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(value) = (*rx.borrow_and_update()).clone() {
                return value;
            }
            // The sender lives in `self`, so `changed` cannot fail while
            // we are borrowed.
            let _ = rx.changed().await;
        }
    }
}
