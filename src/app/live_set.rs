//! Weakly referenced set of live page instances.
//!
//! [`LiveInstanceSet`] maps a unit id to the page instances currently
//! constructed for it. Entries hold [`Weak`] handles only, so the set never
//! keeps a page alive. An [`InstanceKey`] (the allocation address)
//! disambiguates several live instances of the same unit.
//!
//! Pruning is lazy: lookups skip and drop entries whose page was dropped or
//! is no longer attached to the active containment tree.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use tokio::sync::RwLock;

use super::Page;
use crate::unit::UnitId;

/// Identity of one page instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceKey(usize);

impl InstanceKey {
    /// Key of the instance behind `page`.
    #[must_use]
    pub fn of(page: &Arc<dyn Page>) -> Self {
        Self(Arc::as_ptr(page).cast::<()>().addr())
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

type Instances = HashMap<InstanceKey, Weak<dyn Page>>;

/// Registry of live pages, keyed by unit id then instance.
///
/// # Concurrency
///
/// - Registration and pruning take the write lock.
/// - Membership checks share the read lock.
#[derive(Debug, Default)]
pub struct LiveInstanceSet {
    units: RwLock<HashMap<UnitId, Instances>>,
}

impl LiveInstanceSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `page` unless it is already registered.
    ///
    /// Returns `true` if the page was newly registered.
    pub async fn register(&self, page: &Arc<dyn Page>) -> bool {
        let key = InstanceKey::of(page);
        let mut units = self.units.write().await;
        let instances = units.entry(page.unit_id().clone()).or_default();
        if instances.get(&key).is_some_and(|weak| weak.strong_count() > 0) {
            return false;
        }
        instances.insert(key, Arc::downgrade(page));
        tracing::debug!(unit = %page.unit_id(), instance = %key, "page registered");
        true
    }

    /// Returns `true` if `page` is registered and still alive.
    pub async fn contains(&self, page: &Arc<dyn Page>) -> bool {
        let key = InstanceKey::of(page);
        self.units
            .read()
            .await
            .get(page.unit_id())
            .and_then(|instances| instances.get(&key))
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Returns the live, attached instances of `unit`, dropping stale ones.
    pub async fn live(&self, unit: &UnitId) -> Vec<Arc<dyn Page>> {
        let mut units = self.units.write().await;
        let Some(instances) = units.get_mut(unit) else {
            return Vec::new();
        };
        let live = collect_live(instances);
        if instances.is_empty() {
            units.remove(unit);
        }
        live
    }

    /// Returns every live, attached instance, dropping stale ones.
    pub async fn all_live(&self) -> Vec<Arc<dyn Page>> {
        let mut units = self.units.write().await;
        let mut live = Vec::new();
        for instances in units.values_mut() {
            live.extend(collect_live(instances));
        }
        units.retain(|_, instances| !instances.is_empty());
        live
    }

    /// Empties the set and registers exactly `pages`.
    pub async fn replace(&self, pages: &[Arc<dyn Page>]) {
        let mut units = self.units.write().await;
        units.clear();
        for page in pages {
            units
                .entry(page.unit_id().clone())
                .or_default()
                .insert(InstanceKey::of(page), Arc::downgrade(page));
        }
    }

    /// Number of registered entries, stale ones included.
    pub async fn len(&self) -> usize {
        self.units.read().await.values().map(HashMap::len).sum()
    }

    /// Returns `true` if nothing is registered.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn collect_live(instances: &mut Instances) -> Vec<Arc<dyn Page>> {
    let mut live = Vec::with_capacity(instances.len());
    instances.retain(|_, weak| match weak.upgrade() {
        Some(page) if page.is_attached() => {
            live.push(page);
            true
        }
        _ => false,
    });
    live
}
