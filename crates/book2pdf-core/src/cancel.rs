//! Cooperative cancellation
//!
//! A [`CancelToken`] is cloned into every component of one run. Network
//! calls and the converter child race against it; page loops check it
//! between pages.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// Shared cancellation flag
#[derive(Debug, Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancelToken {
    /// Create an uncancelled token
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Cancel every clone of this token
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Check the flag without waiting
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve once the token is cancelled
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            // sender lives as long as any clone, so this never resolves
            std::future::pending::<()>().await;
        }
    }

    /// Drive `fut` to completion unless cancelled first
    ///
    /// Returns `None` when cancellation won the race; `fut` is dropped.
    pub async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        if self.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            () = self.cancelled() => None,
            out = fut => Some(out),
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
