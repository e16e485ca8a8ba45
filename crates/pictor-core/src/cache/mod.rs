//! Bounded, self-healing cache for network-fetched resources.
//!
//! - [`CacheStore`]: fetch-through cache with recovery on open
//! - [`CacheBackend`] / [`BackendProvider`]: the persistence seam
//! - [`SqliteProvider`]: one SQLite database per namespace
//! - [`MemoryProvider`]: process-local storage

mod memory;
mod sqlite;
mod store;
mod traits;

pub use memory::{MemoryBackend, MemoryProvider};
pub use sqlite::{SqliteBackend, SqliteProvider};
pub use store::CacheStore;
pub use traits::{
    BackendOptions, BackendProvider, BackendStats, CacheBackend, CacheConfig, CacheEntry,
    CacheStats,
};
