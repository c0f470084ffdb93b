//! Caller-side cancellation for blocking reads.
//!
//! A `CancelToken` is handed to each read. It fires when the caller
//! cancels it or, if it carries one, when its deadline passes. Firing only
//! unblocks the read it was passed to; the listener keeps running.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a read was unblocked without a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// The caller cancelled the token.
    Caller,
    /// The token's deadline passed.
    DeadlineExceeded,
    /// The input was closed or its listener stopped.
    ListenerClosed,
}

impl std::fmt::Display for CancelCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelCause::Caller => write!(f, "cancelled by caller"),
            CancelCause::DeadlineExceeded => write!(f, "deadline exceeded"),
            CancelCause::ListenerClosed => write!(f, "listener closed"),
        }
    }
}

/// Cancellation token passed into each read.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that only fires when cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that also fires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// A token that also fires after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Cancel every read watching this token (and its clones).
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the token has fired.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves with the cause once the token fires.
    pub async fn cancelled(&self) -> CancelCause {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => CancelCause::Caller,
                _ = tokio::time::sleep_until(deadline) => CancelCause::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                CancelCause::Caller
            }
        }
    }
}

impl From<CancellationToken> for CancelToken {
    fn from(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_reports_caller() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.cancelled().await, CancelCause::Caller);
    }

    #[tokio::test]
    async fn deadline_reports_deadline() {
        let token = CancelToken::with_timeout(Duration::from_millis(50));
        assert!(!token.is_cancelled());
        assert_eq!(token.cancelled().await, CancelCause::DeadlineExceeded);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn wraps_external_token() {
        let external = CancellationToken::new();
        let token = CancelToken::from(external.clone());
        external.cancel();
        assert_eq!(token.cancelled().await, CancelCause::Caller);
    }
}
