//! Versioned cache buckets for offline support.
//!
//! This module provides the storage half of the offline controller:
//! - Named buckets of request/response pairs, a STATIC bucket filled at install
//!   and a DYNAMIC bucket grown from successful fetches
//! - A cache-first fetch policy that never revalidates hits
//! - Offline fallbacks (offline page for navigations, cached copy otherwise)

mod layer;
mod storage;
mod traits;

pub use layer::{should_cache, BucketNames, CacheLayer};
pub use storage::{CacheStorage, SqliteStorage};
pub use traits::{CacheResult, CacheSource, CachedResponse, RequestKey};
