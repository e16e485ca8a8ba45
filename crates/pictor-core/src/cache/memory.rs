//! Process-local cache backend.

use super::traits::{BackendOptions, BackendProvider, BackendStats, CacheBackend, CacheEntry};
use crate::error::{PictorError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredEntry {
    payload: Vec<u8>,
    fetched_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    seq: u64,
}

type Entries = Arc<RwLock<HashMap<String, StoredEntry>>>;

/// In-memory blob store for one namespace.
///
/// Reads share the lock; writes (including eviction) take it exclusively.
pub struct MemoryBackend {
    entries: Entries,
    next_seq: Arc<AtomicU64>,
    options: BackendOptions,
}

impl MemoryBackend {
    pub fn new(options: BackendOptions) -> Self {
        Self {
            entries: Arc::default(),
            next_seq: Arc::default(),
            options,
        }
    }
}

fn poisoned(e: impl std::fmt::Display) -> PictorError {
    PictorError::Database {
        message: format!("Memory cache lock poisoned: {}", e),
        source: None,
    }
}

impl CacheBackend for MemoryBackend {
    fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let entries = self.entries.read().map_err(poisoned)?;
        let now = Utc::now();

        Ok(entries
            .get(key)
            .filter(|stored| stored.expires_at > now)
            .map(|stored| CacheEntry {
                key: key.to_string(),
                payload: stored.payload.clone(),
                fetched_at: stored.fetched_at,
                expires_at: stored.expires_at,
                size_bytes: stored.payload.len() as u64,
            }))
    }

    fn put(&self, key: &str, value: &[u8], fetched_at: DateTime<Utc>) -> Result<usize> {
        let mut entries = self.entries.write().map_err(poisoned)?;

        entries.insert(
            key.to_string(),
            StoredEntry {
                payload: value.to_vec(),
                fetched_at,
                expires_at: self.options.expires_at(fetched_at),
                seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            },
        );

        let mut evicted = 0;
        while entries.len() > self.options.max_entries {
            let oldest = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .min_by_key(|(_, stored)| (stored.fetched_at, stored.seq))
                .map(|(k, _)| k.clone());
            match oldest {
                Some(oldest) => {
                    entries.remove(&oldest);
                    evicted += 1;
                }
                None => break,
            }
        }

        if evicted > 0 {
            debug!(
                "Evicted {} entries to stay under {} entries",
                evicted, self.options.max_entries
            );
        }

        Ok(evicted)
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        Ok(entries.remove(key).is_some())
    }

    fn clear(&self) -> Result<usize> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        let count = entries.len();
        entries.clear();
        Ok(count)
    }

    fn sweep_expired(&self) -> Result<usize> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        let now = Utc::now();
        let before = entries.len();
        entries.retain(|_, stored| stored.expires_at > now);
        Ok(before - entries.len())
    }

    fn stats(&self) -> Result<BackendStats> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(BackendStats {
            entry_count: entries.len(),
            total_size_bytes: entries.values().map(|e| e.payload.len() as u64).sum(),
        })
    }

    fn options(&self) -> BackendOptions {
        self.options
    }
}

/// Keeps in-memory namespaces alive for the provider's lifetime, so
/// reopening a namespace sees what was stored before.
#[derive(Default)]
pub struct MemoryProvider {
    namespaces: Mutex<HashMap<String, (Entries, Arc<AtomicU64>)>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `namespace` has been opened and not deleted since.
    #[cfg(test)]
    fn contains(&self, namespace: &str) -> bool {
        self.namespaces
            .lock()
            .map(|namespaces| namespaces.contains_key(namespace))
            .unwrap_or(false)
    }
}

impl BackendProvider for MemoryProvider {
    fn open(&self, namespace: &str, options: &BackendOptions) -> Result<Arc<dyn CacheBackend>> {
        let mut namespaces = self.namespaces.lock().map_err(poisoned)?;
        let (entries, next_seq) = namespaces.entry(namespace.to_string()).or_default();
        Ok(Arc::new(MemoryBackend {
            entries: entries.clone(),
            next_seq: next_seq.clone(),
            options: *options,
        }))
    }

    fn delete_all(&self, namespace: &str) -> Result<()> {
        let mut namespaces = self.namespaces.lock().map_err(poisoned)?;
        if let Some((entries, _)) = namespaces.remove(namespace) {
            entries.write().map_err(poisoned)?.clear();
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}
