//! Last-value cache of unit payloads.
//!
//! [`UnitCache`] holds one [`CacheEntry`] per unit and [`UnitKind`]: the
//! last compressed payload received (application side) or pushed (tool
//! side). Pages and code units live in separate key spaces, so a code unit
//! never shadows page markup of the same name. Writes are last-write-wins;
//! each store advances a cache-wide version counter so entries of both
//! kinds can be replayed in delivery order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

use super::UnitId;

/// What a cached payload holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    /// Compressed page markup.
    Page,
    /// Compressed code unit image.
    Code,
}

/// Last known payload of one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Page markup or code image.
    pub kind: UnitKind,
    /// Compressed payload exactly as it travelled on the wire.
    pub payload: Vec<u8>,
    /// Delivery-order version; higher is newer.
    pub version: u64,
}

/// Concurrent map of (kind, unit id) → [`CacheEntry`].
///
/// Structural mutation takes the write lock; lookups share the read lock.
#[derive(Debug, Default)]
pub struct UnitCache {
    entries: RwLock<HashMap<(UnitKind, UnitId), CacheEntry>>,
    next_version: AtomicU64,
}

impl UnitCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `payload` as the `kind` entry of `unit`, replacing any
    /// previous one.
    ///
    /// Returns the version assigned to the new entry.
    pub async fn store(&self, kind: UnitKind, unit: UnitId, payload: Vec<u8>) -> u64 {
        let mut map = self.entries.write().await;
        let version = self.next_version.fetch_add(1, Ordering::Relaxed) + 1;
        map.insert(
            (kind, unit),
            CacheEntry {
                kind,
                payload,
                version,
            },
        );
        version
    }

    /// Returns a copy of the `kind` entry for `unit`, if any.
    pub async fn get(&self, kind: UnitKind, unit: &UnitId) -> Option<CacheEntry> {
        self.entries.read().await.get(&(kind, unit.clone())).cloned()
    }

    /// Returns every entry of both kinds, oldest version first.
    pub async fn snapshot(&self) -> Vec<(UnitId, CacheEntry)> {
        let map = self.entries.read().await;
        let mut all: Vec<_> = map
            .iter()
            .map(|((_, unit), entry)| (unit.clone(), entry.clone()))
            .collect();
        all.sort_by_key(|(_, entry)| entry.version);
        all
    }

    /// Removes every entry.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Returns the number of entries of both kinds.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns `true` if no unit is cached.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
