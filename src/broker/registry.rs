//! Concurrent peer registry with snapshot fan-out.
//!
//! [`PeerRegistry`] stores every connected peer in a `HashMap` behind a
//! [`tokio::sync::RwLock`]. Connects and disconnects take the write lock;
//! a fan-out clones the current peer list under the read lock and forwards
//! after releasing it, so concurrent registrations never disturb a fan-out
//! in progress and peers registered after the snapshot do not receive it.

use std::collections::HashMap;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::RwLock;

use super::{Peer, PeerId};
use crate::protocol::PeerRole;

/// Central store of connected peers.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: RwLock<HashMap<PeerId, Peer>>,
}

impl PeerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a peer.
    pub async fn register(&self, peer: Peer) {
        let (id, role) = (peer.id, peer.role);
        let mut map = self.peers.write().await;
        map.insert(id, peer);
        tracing::info!(peer_id = %id, %role, peers = map.len(), "peer registered");
    }

    /// Removes a peer. Returns `true` if it was registered.
    pub async fn remove(&self, id: PeerId) -> bool {
        let mut map = self.peers.write().await;
        let removed = map.remove(&id).is_some();
        if removed {
            tracing::info!(peer_id = %id, peers = map.len(), "peer removed");
        }
        removed
    }

    /// Forwards `frame` unchanged to every registered peer except `from`.
    ///
    /// Returns the number of peers the frame was queued for.
    pub async fn fan_out(&self, from: PeerId, frame: &Utf8Bytes) -> usize {
        let targets: Vec<Peer> = self
            .peers
            .read()
            .await
            .values()
            .filter(|peer| peer.id != from)
            .cloned()
            .collect();

        targets
            .iter()
            .filter(|peer| peer.forward(frame.clone()))
            .count()
    }

    /// Number of peers of `role`.
    pub async fn count_role(&self, role: PeerRole) -> usize {
        self.peers
            .read()
            .await
            .values()
            .filter(|peer| peer.role == role)
            .count()
    }

    /// Number of registered peers.
    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Returns `true` if no peer is registered.
    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }
}
