//! Cooperative stop signal shared by every unit of a monitoring run

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Broadcast stop flag.
///
/// Starts cleared, is set once per run (setting again is a no-op) and is
/// observed by workers and the reporter at each of their suspension points.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Ask every unit to stop. Returns `false` if it was already set.
    pub fn set(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Clear the flag for a new run
    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    /// Resolves once the signal is set
    pub async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        // the sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Sleep for `duration`, waking early when the signal is set.
    ///
    /// Returns `true` if the signal is set.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_set(),
            _ = self.stopped() => true,
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}
