//! Connected peers of the broker.

use std::fmt;

use axum::extract::ws::Utf8Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::protocol::PeerRole;

/// Identifier of one broker connection.
///
/// Wraps a UUID v4 generated at handshake time. A reconnecting client gets
/// a new id; the broker keeps no identity across connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(uuid::Uuid);

impl PeerId {
    /// Creates a new random `PeerId`.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One registered connection: its role and the queue feeding its socket.
#[derive(Debug, Clone)]
pub struct Peer {
    /// Connection identifier.
    pub id: PeerId,
    /// Role declared in the handshake query.
    pub role: PeerRole,
    outbound: mpsc::UnboundedSender<Utf8Bytes>,
}

impl Peer {
    /// Creates a peer and the receiving end of its outbound queue.
    #[must_use]
    pub fn new(role: PeerRole) -> (Self, mpsc::UnboundedReceiver<Utf8Bytes>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: PeerId::new(),
                role,
                outbound,
            },
            rx,
        )
    }

    /// Queues a frame for this peer. Returns `false` if its socket is gone.
    pub fn forward(&self, frame: Utf8Bytes) -> bool {
        self.outbound.send(frame).is_ok()
    }
}
