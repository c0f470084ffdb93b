//! Caller-facing acknowledgment.
//!
//! An [`AckHandle`] travels with every delivered unit. Calling
//! [`AckHandle::ack`] tells the connection that produced the unit whether
//! downstream processing succeeded. Dropping the handle without calling it
//! counts as a failure.

use std::fmt::Display;

use tokio::sync::oneshot;

use crate::input::InputError;

/// What the connection should do with the unit it is holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Processing succeeded; acknowledge to the peer.
    Commit,
    /// Processing failed; withhold the acknowledgment so the peer resends.
    Reject,
}

/// Acknowledgment for one delivered unit.
#[derive(Debug)]
#[must_use = "dropping an AckHandle rejects the unit"]
pub struct AckHandle {
    target: Option<oneshot::Sender<AckOutcome>>,
}

impl AckHandle {
    /// A handle whose connection waits on the returned receiver.
    pub(crate) fn channel() -> (Self, oneshot::Receiver<AckOutcome>) {
        let (tx, rx) = oneshot::channel();
        (Self { target: Some(tx) }, rx)
    }

    /// A handle with nothing behind it.
    pub(crate) fn noop() -> Self {
        Self { target: None }
    }

    /// Whether acknowledging has any effect on the peer.
    pub fn is_noop(&self) -> bool {
        self.target.is_none()
    }

    /// Report the processing outcome.
    ///
    /// `Ok` commits the unit; `Err` rejects it. Fails with
    /// [`InputError::Ack`] when the connection that produced the unit is
    /// already gone, in which case the peer will not see the outcome.
    pub fn ack<E: Display>(self, outcome: Result<(), E>) -> Result<(), InputError> {
        let Some(target) = self.target else {
            return Ok(());
        };
        let outcome = match outcome {
            Ok(()) => AckOutcome::Commit,
            Err(e) => {
                tracing::debug!(error = %e, "Unit rejected by caller");
                AckOutcome::Reject
            }
        };
        target.send(outcome).map_err(|_| InputError::Ack)
    }

    /// Shorthand for a successful [`ack`](Self::ack).
    pub fn commit(self) -> Result<(), InputError> {
        self.ack(Ok::<(), std::convert::Infallible>(()))
    }
}
