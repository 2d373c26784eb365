//! Versioned response cache with offline support.
//!
//! This module provides the storage side of the offline cache manager:
//! - Named namespaces, one per deployed version, each mapping request keys to responses
//! - Network-first and cache-first strategies with configurable write-back
//! - Soft failure: storage errors degrade to cache misses, never to failed fetches

mod layer;
mod storage;
mod traits;

pub use layer::{live_response, CacheLayer};
pub use storage::{CacheStorage, CachedResponse, MemoryStorage, SqliteStorage};
pub use traits::{CacheResult, CacheSource, StorePolicy};
