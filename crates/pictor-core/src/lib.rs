//! Pictor Core - locator classification and a self-healing resource cache.
//!
//! A locator (URL or path) is classified into a [`ResourceKind`]. Network
//! locators are served through a [`CacheStore`]: a persistent, bounded,
//! time-expiring store that fetches on a miss and rebuilds itself under a
//! backup namespace when its backend is corrupt. Decoding and rendering are
//! left to the host.
//!
//! # Example
//!
//! ```rust,no_run
//! use pictor_core::{CacheConfig, CacheStore, HttpFetcher, ResourceLoader, SqliteProvider};
//! use std::sync::Arc;
//!
//! # async fn run() -> pictor_core::Result<()> {
//! let provider = SqliteProvider::new("/tmp/pictor");
//! let fetcher = Arc::new(HttpFetcher::new()?);
//! let store = CacheStore::open(&CacheConfig::new("images"), &provider, fetcher)?;
//!
//! let loader = ResourceLoader::new(Arc::new(store));
//! let resource = loader.load("https://example.com/logo.png").await?;
//! println!("{} bytes of {}", resource.bytes.len(), resource.kind);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod network;
pub mod resource;

// Re-export commonly used types
pub use cache::{
    BackendOptions, BackendProvider, CacheBackend, CacheConfig, CacheEntry, CacheStats,
    CacheStore, MemoryProvider, SqliteProvider,
};
pub use error::{PictorError, Result};
pub use network::{ByteFetcher, HttpFetcher};
pub use resource::{classify, LoadedResource, ResourceKind, ResourceLoader};
