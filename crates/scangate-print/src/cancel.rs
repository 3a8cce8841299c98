// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cancellation plumbing for long-running print jobs.

use tokio::sync::watch;

/// Create a linked cancel handle/token pair.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

/// Held by the connection that owns the job; cancelling is idempotent.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Observed by the monitor at every await point.
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve when cancellation is requested.  If the handle is dropped
    /// without cancelling, the job is never cancelled and this pends
    /// forever (the monitor's own deadlines still apply).
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_resolves_waiters() {
        let (handle, mut token) = cancel_pair();
        assert!(!token.is_cancelled());

        handle.cancel();
        handle.cancel(); // idempotent

        assert!(token.is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("cancelled() must resolve after cancel()");
    }

    #[tokio::test]
    async fn dropped_handle_without_cancel_never_resolves() {
        let (handle, mut token) = cancel_pair();
        drop(handle);
        assert!(!token.is_cancelled());
        let waited =
            tokio::time::timeout(Duration::from_millis(50), token.cancelled()).await;
        assert!(waited.is_err());
    }
}
