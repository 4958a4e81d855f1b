//! Cache module for bounding upstream load
//!
//! This module provides the `CacheStore` contract with in-memory and on-disk
//! implementations, and the `CacheManager` that layers namespacing, TTLs,
//! versioned envelopes and stale-while-revalidate on top of a store. Store
//! failures degrade to cache misses so callers fall through to the upstream.

mod file_store;
mod manager;
mod store;

pub use file_store::FileStore;
pub use manager::{kinds, CacheManager, HealthStatus, TtlPolicy, SCHEMA_VERSION};
pub use store::{CacheStore, Clock, ManualClock, MemoryStore, StoreError, SystemClock};
