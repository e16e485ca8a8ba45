//! Cache backend traits and types.

use crate::config::PathsConfig;
use crate::error::{PictorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a [`super::CacheStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct CacheConfig {
    /// Namespace the primary backend is opened under.
    pub namespace: String,
    /// How long a fetched entry stays fresh.
    pub stale_period: Duration,
    /// Maximum number of entries before eviction kicks in.
    pub max_entries: usize,
    /// Namespace used when the primary backend cannot be opened.
    /// Defaults to `namespace + "_backup"`.
    pub backup_namespace: Option<String>,
}

impl CacheConfig {
    /// Default stale period (7 days).
    pub const DEFAULT_STALE_PERIOD_SECS: u64 = 604_800;
    /// Default maximum entry count.
    pub const DEFAULT_MAX_ENTRIES: usize = 1000;

    /// Create a configuration with defaults for the given namespace.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    pub fn with_stale_period(mut self, stale_period: Duration) -> Self {
        self.stale_period = stale_period;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_backup_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.backup_namespace = Some(namespace.into());
        self
    }

    /// Resolve the backup namespace, deriving it when not set explicitly.
    pub fn backup_namespace(&self) -> String {
        self.backup_namespace.clone().unwrap_or_else(|| {
            format!("{}{}", self.namespace, PathsConfig::BACKUP_NAMESPACE_SUFFIX)
        })
    }

    /// Backend options for the primary namespace.
    pub fn primary_options(&self) -> BackendOptions {
        BackendOptions {
            stale_period: self.stale_period,
            max_entries: self.max_entries,
        }
    }

    /// Backend options for the backup namespace.
    ///
    /// Keeps the stale period but falls back to the default capacity.
    pub fn backup_options(&self) -> BackendOptions {
        BackendOptions {
            stale_period: self.stale_period,
            max_entries: Self::DEFAULT_MAX_ENTRIES,
        }
    }

    /// Check the configuration for values no backend can work with.
    pub fn validate(&self) -> Result<()> {
        validate_namespace(&self.namespace)?;
        let backup = self.backup_namespace();
        validate_namespace(&backup)?;
        if backup == self.namespace {
            return Err(PictorError::Config {
                message: format!("backup namespace must differ from '{}'", self.namespace),
            });
        }
        if self.max_entries == 0 {
            return Err(PictorError::Config {
                message: "max_entries must be at least 1".to_string(),
            });
        }
        if self.stale_period.is_zero() {
            return Err(PictorError::Config {
                message: "stale_period must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| PictorError::io_with_path(e, path))?;
        let config: CacheConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: PathsConfig::DEFAULT_NAMESPACE.to_string(),
            stale_period: Duration::from_secs(CacheConfig::DEFAULT_STALE_PERIOD_SECS),
            max_entries: CacheConfig::DEFAULT_MAX_ENTRIES,
            backup_namespace: None,
        }
    }
}

fn validate_namespace(namespace: &str) -> Result<()> {
    if namespace.is_empty() {
        return Err(PictorError::Config {
            message: "namespace must not be empty".to_string(),
        });
    }
    if namespace.contains(['/', '\\']) || namespace == "." || namespace == ".." {
        return Err(PictorError::Config {
            message: format!("namespace '{}' is not a plain name", namespace),
        });
    }
    Ok(())
}

/// Capacity and staleness rules a backend enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendOptions {
    pub stale_period: Duration,
    pub max_entries: usize,
}

impl BackendOptions {
    /// Expiry time for an entry fetched at `fetched_at`.
    pub fn expires_at(&self, fetched_at: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.stale_period)
            .ok()
            .and_then(|ttl| fetched_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// A cached network resource.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The locator this entry was fetched from.
    pub key: String,
    /// Raw fetched bytes.
    pub payload: Vec<u8>,
    /// When the bytes were last fetched.
    pub fetched_at: DateTime<Utc>,
    /// When the entry stops being served.
    pub expires_at: DateTime<Utc>,
    /// Length of `payload` in bytes.
    pub size_bytes: u64,
}

impl CacheEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Counters reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendStats {
    /// Entries physically stored, including expired ones not yet swept.
    pub entry_count: usize,
    pub total_size_bytes: u64,
}

/// Cache statistics as seen by the store's caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    /// Namespace actually in use (the backup one after recovery).
    pub namespace: String,
    pub entry_count: usize,
    pub total_size_bytes: u64,
    pub max_entries: usize,
    pub stale_period: Duration,
    /// True when the primary backend could not be opened.
    pub degraded: bool,
}

/// An opened, namespace-bound blob store.
///
/// All operations are synchronous to match rusqlite's API. Implementations
/// must never return an entry past its `expires_at`, and must keep at most
/// `max_entries` entries by evicting the least recently fetched ones.
pub trait CacheBackend: Send + Sync {
    /// Get a live entry by key.
    fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Get a live payload by key.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.get_entry(key).map(|opt| opt.map(|e| e.payload))
    }

    /// Store a payload fetched at `fetched_at`, replacing any entry for `key`.
    ///
    /// Returns the number of entries evicted to stay within capacity.
    fn put(&self, key: &str, value: &[u8], fetched_at: DateTime<Utc>) -> Result<usize>;

    /// Delete a single entry.
    fn remove(&self, key: &str) -> Result<bool>;

    /// Delete every entry.
    fn clear(&self) -> Result<usize>;

    /// Physically delete expired entries.
    fn sweep_expired(&self) -> Result<usize>;

    fn stats(&self) -> Result<BackendStats>;

    /// Options this backend was opened with.
    fn options(&self) -> BackendOptions;
}

/// Opens and destroys backends by namespace.
pub trait BackendProvider: Send + Sync {
    /// Open (creating if needed) the backend for `namespace`.
    fn open(&self, namespace: &str, options: &BackendOptions) -> Result<Arc<dyn CacheBackend>>;

    /// Remove everything stored under `namespace`, whether or not it opens.
    fn delete_all(&self, namespace: &str) -> Result<()>;

    /// Short identifier for logs.
    fn kind(&self) -> &'static str;
}
