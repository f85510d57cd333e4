//! Shared cancellation signal for async tasks.
//!
//! A [`CancelSignal`] can be cloned and handed to any number of tasks. Once
//! [`CancelSignal::cancel`] is called on any clone, every clone observes it,
//! both by polling [`CancelSignal::is_cancelled`] and by awaiting
//! [`CancelSignal::cancelled`]. Cancellation is permanent.

use std::sync::Arc;

use tokio::sync::watch;

/// Cloneable, awaitable, one-way cancellation flag.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelSignal {
    /// Creates a signal in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Requests cancellation. Returns `true` if this call flipped the flag.
    pub fn cancel(&self) -> bool {
        self.tx.send_if_modified(|cancelled| {
            let first = !*cancelled;
            *cancelled = true;
            first
        })
    }

    /// Checks if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Completes once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}
