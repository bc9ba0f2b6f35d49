//! Single-slot completion channels.
//!
//! A [`Ticket`] pairs a waitable receipt with a [`Completion`] that is
//! consumed by delivering exactly one result. Operations on a database
//! handle complete through continuations on worker threads; a ticket is
//! the bridge for callers who want to block on the outcome instead.
//!
//! # Example
//!
//! ```rust,ignore
//! let (ticket, done) = Ticket::new();
//! db.put(b"k".to_vec(), b"v".to_vec(), move |res| done.complete(res));
//! ticket.wait()?;
//! ```

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::status::{Status, StoreResult};

/// The receiving half of a completion slot.
#[derive(Debug)]
pub struct Ticket<T> {
    rx: Receiver<StoreResult<T>>,
}

/// The producing half of a completion slot.
///
/// Consumed by [`complete`](Self::complete), so a result can be delivered
/// at most once. Dropping a completion without delivering is reported to
/// the waiter as an error rather than a hang.
#[derive(Debug)]
pub struct Completion<T> {
    tx: Sender<StoreResult<T>>,
}

impl<T> Ticket<T> {
    /// Creates a connected ticket/completion pair.
    #[must_use]
    pub fn new() -> (Self, Completion<T>) {
        let (tx, rx) = mpsc::channel();
        (Self { rx }, Completion { tx })
    }

    /// Blocks until the result is delivered.
    pub fn wait(self) -> StoreResult<T> {
        self.rx
            .recv()
            .unwrap_or_else(|_| Err(Status::invalid_state("completion dropped without a result")))
    }

    /// Blocks until the result is delivered or the timeout elapses.
    ///
    /// Returns `None` on timeout; the ticket is consumed either way.
    pub fn wait_timeout(self, timeout: Duration) -> Option<StoreResult<T>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(Status::invalid_state(
                "completion dropped without a result",
            ))),
        }
    }
}

impl<T> Completion<T> {
    /// Delivers the result, consuming the completion.
    pub fn complete(self, result: StoreResult<T>) {
        // The waiter may have given up already; delivery is best-effort.
        let _ = self.tx.send(result);
    }
}
