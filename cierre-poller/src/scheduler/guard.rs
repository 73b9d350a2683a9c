//! Shared stop guard
//!
//! One guard is handed to every poller of a workflow. Stopping it ends every
//! session started through it within one tick, and prevents new sessions from
//! starting. A stopped guard stays stopped; a new workflow takes a new guard.

use tokio_util::sync::CancellationToken;

/// "Stop all polling" signal shared by the sessions of one workflow
#[derive(Debug, Clone, Default)]
pub struct StopGuard {
    token: CancellationToken,
}

impl StopGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops every session observing this guard
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once the guard is stopped
    pub async fn stopped(&self) {
        self.token.cancelled().await
    }

    /// Token for one session, cancelled when the guard stops
    ///
    /// Cancelling the returned token does not stop the guard.
    pub(crate) fn session_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}
