//! Connection state and the first-attempt ready signal.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

/// Lifecycle of a session. There is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Initial state; also entered when a tool-side start fails.
    Disconnected,
    /// The resolver is running, or waiting to retry.
    Discovering,
    /// A channel is open and registered.
    Connected,
    /// The channel dropped; the last endpoint is being polled.
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Discovering => "discovering",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

/// One-shot signal settled when the first connection attempt finishes,
/// whether it succeeded or failed. Later attempts never touch it.
#[derive(Debug, Clone)]
pub struct ReadySignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ReadySignal {
    /// Creates an unsettled signal.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Settles the signal. Returns `true` only for the first call.
    pub fn settle(&self) -> bool {
        self.tx.send_if_modified(|settled| {
            let first = !*settled;
            *settled = true;
            first
        })
    }

    /// Returns `true` once the first attempt has settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Waits until the first attempt has settled.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|settled| *settled).await;
    }
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn settles_exactly_once() {
        let ready = ReadySignal::new();
        assert!(!ready.is_settled());
        assert!(ready.settle());
        assert!(!ready.settle());
        assert!(ready.is_settled());
    }

    #[tokio::test]
    async fn early_waiters_block_until_settled() {
        let ready = ReadySignal::new();
        let waiter = {
            let ready = ready.clone();
            tokio::spawn(async move { ready.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        ready.settle();
        let joined = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(matches!(joined, Ok(Ok(()))));
    }

    #[test]
    fn state_display_is_snake_case() {
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
    }
}
