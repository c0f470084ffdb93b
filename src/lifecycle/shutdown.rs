//! Shutdown coordination for an input.

use tokio_util::sync::CancellationToken;

/// Coordinator for graceful shutdown.
///
/// Each input owns exactly one. The acceptor, every connection task and
/// any parked reader watch the same token, so one `trigger` tears all of
/// them down. Clones share the token.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger the shutdown signal. Idempotent.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been triggered.
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown is triggered.
    pub async fn triggered(&self) {
        self.token.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_wakes_every_clone() {
        let shutdown = Shutdown::new();
        let watcher = shutdown.clone();
        let waiter = tokio::spawn(async move { watcher.triggered().await });

        assert!(!shutdown.is_triggered());
        shutdown.trigger();
        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("watcher should wake")
            .unwrap();
        assert!(shutdown.is_triggered());
    }
}
