//! Reloadable units: identifiers and the per-unit last-value cache.

pub mod cache;
pub mod unit_id;

pub use cache::{CacheEntry, UnitCache, UnitKind};
pub use unit_id::UnitId;
