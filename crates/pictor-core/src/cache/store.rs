//! Cache store for network-fetched resources.
//!
//! Wraps one [`CacheBackend`] and one [`ByteFetcher`]:
//! - cache hit: bytes come straight from the backend
//! - miss or expired: fetch, store, return
//! - concurrent misses on one locator share a single fetch
//!
//! Opening the store never fails because the primary backend is unusable.
//! That namespace is wiped and a fresh backup namespace is used instead.

use super::traits::{BackendProvider, CacheBackend, CacheConfig, CacheStats};
use crate::error::{PictorError, Result};
use crate::network::ByteFetcher;
use bytes::Bytes;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

/// Initialization states. Only `Ready` ever leaves [`initialize`].
enum InitState {
    Fresh,
    Degraded { cause: PictorError },
    Ready(OpenedBackend),
}

struct OpenedBackend {
    backend: Arc<dyn CacheBackend>,
    namespace: String,
    degraded: bool,
}

/// Run the open/recover sequence to completion.
fn initialize(provider: &dyn BackendProvider, config: &CacheConfig) -> Result<OpenedBackend> {
    let mut state = InitState::Fresh;

    loop {
        state = match state {
            InitState::Fresh => {
                match provider.open(&config.namespace, &config.primary_options()) {
                    Ok(backend) => InitState::Ready(OpenedBackend {
                        backend,
                        namespace: config.namespace.clone(),
                        degraded: false,
                    }),
                    Err(cause) => InitState::Degraded { cause },
                }
            }
            InitState::Degraded { cause } => {
                warn!(
                    "Cache backend '{}' ({}) unusable, recovering: {}",
                    config.namespace,
                    provider.kind(),
                    cause
                );

                if let Err(e) = provider.delete_all(&config.namespace) {
                    warn!(
                        "Ignoring failure to clear cache namespace '{}': {}",
                        config.namespace, e
                    );
                }

                let backup = config.backup_namespace();
                let backend = provider
                    .open(&backup, &config.backup_options())
                    .map_err(|e| PictorError::BackupBackendOpenFailed {
                        namespace: backup.clone(),
                        message: e.to_string(),
                    })?;

                info!("Using backup cache namespace '{}'", backup);
                InitState::Ready(OpenedBackend {
                    backend,
                    namespace: backup,
                    degraded: true,
                })
            }
            InitState::Ready(opened) => return Ok(opened),
        };
    }
}

/// Persistent, bounded, time-expiring cache of fetched bytes keyed by locator.
///
/// Construct one per namespace and share it behind an `Arc`.
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    fetcher: Arc<dyn ByteFetcher>,
    namespace: String,
    degraded: bool,
    /// Per-locator locks held while a fetch is in progress.
    in_flight: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl CacheStore {
    /// Open the store, falling back to the backup namespace if the primary
    /// backend cannot be opened.
    ///
    /// Fails only on an invalid configuration or when the backup backend
    /// cannot be opened either.
    pub fn open(
        config: &CacheConfig,
        provider: &dyn BackendProvider,
        fetcher: Arc<dyn ByteFetcher>,
    ) -> Result<Self> {
        config.validate()?;

        let opened = initialize(provider, config)?;
        debug!(
            "Cache store ready on '{}' ({}, max {} entries)",
            opened.namespace,
            provider.kind(),
            opened.backend.options().max_entries
        );

        Ok(Self {
            backend: opened.backend,
            fetcher,
            namespace: opened.namespace,
            degraded: opened.degraded,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    /// Namespace in use, which is the backup one after recovery.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Whether the primary backend failed to open.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Get the bytes for `locator`, fetching them on a miss.
    ///
    /// Only fetch failures are returned. Backend read or write errors are
    /// logged and treated as a miss or a skipped write.
    pub async fn get(&self, locator: &str) -> Result<Bytes> {
        if let Some(bytes) = self.lookup(locator) {
            return Ok(bytes);
        }

        // Declared before the guard so the guard drops first, including
        // when this future is cancelled mid-fetch.
        let lease = self.acquire_key(locator);
        let _guard = lease.lock.lock().await;
        match self.lookup(locator) {
            // Filled by a concurrent caller while we waited
            Some(bytes) => Ok(bytes),
            None => self.fetch_and_store(locator).await,
        }
    }

    /// Get cached bytes without touching the network.
    pub fn get_cached(&self, locator: &str) -> Result<Option<Bytes>> {
        Ok(self.backend.get(locator)?.map(Bytes::from))
    }

    /// Store bytes as if they had just been fetched.
    pub fn put(&self, locator: &str, bytes: &[u8]) -> Result<()> {
        self.backend.put(locator, bytes, Utc::now())?;
        Ok(())
    }

    /// Drop the entry for `locator`. Returns whether one existed.
    pub fn remove(&self, locator: &str) -> Result<bool> {
        self.backend.remove(locator)
    }

    /// Drop every entry in the active namespace.
    pub fn clear(&self) -> Result<usize> {
        let cleared = self.backend.clear()?;
        info!("Cleared {} entries from cache '{}'", cleared, self.namespace);
        Ok(cleared)
    }

    /// Physically delete expired entries.
    pub fn sweep_expired(&self) -> Result<usize> {
        self.backend.sweep_expired()
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let counts = self.backend.stats()?;
        let options = self.backend.options();
        Ok(CacheStats {
            namespace: self.namespace.clone(),
            entry_count: counts.entry_count,
            total_size_bytes: counts.total_size_bytes,
            max_entries: options.max_entries,
            stale_period: options.stale_period,
            degraded: self.degraded,
        })
    }

    fn lookup(&self, locator: &str) -> Option<Bytes> {
        match self.backend.get(locator) {
            Ok(Some(value)) => {
                debug!("Cache hit: {}", locator);
                Some(Bytes::from(value))
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Cache read failed for {}, fetching instead: {}", locator, e);
                None
            }
        }
    }

    async fn fetch_and_store(&self, locator: &str) -> Result<Bytes> {
        debug!("Cache miss: {}", locator);
        let bytes = self.fetcher.fetch(locator).await?;

        if let Err(e) = self.backend.put(locator, &bytes, Utc::now()) {
            warn!("Failed to cache {}: {}", locator, e);
        }

        Ok(bytes)
    }

    fn acquire_key<'a>(&'a self, locator: &'a str) -> KeyLease<'a> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let lock = in_flight.entry(locator.to_string()).or_default().clone();
        KeyLease {
            store: self,
            locator,
            lock,
        }
    }
}

/// A handle on one locator's in-flight lock.
///
/// Dropping it removes the map entry once no other caller holds a lease,
/// whether `get` finished or was cancelled.
struct KeyLease<'a> {
    store: &'a CacheStore,
    locator: &'a str,
    lock: Arc<AsyncMutex<()>>,
}

impl Drop for KeyLease<'_> {
    fn drop(&mut self) {
        let mut in_flight = self
            .store
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // The map's handle plus this one: nobody else is waiting on this locator.
        if in_flight
            .get(self.locator)
            .is_some_and(|lock| Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2)
        {
            in_flight.remove(self.locator);
        }
    }
}
