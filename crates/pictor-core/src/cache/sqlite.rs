//! SQLite-based cache backend.
//!
//! Each namespace gets its own database file so a corrupt namespace can be
//! deleted wholesale without touching the others.

use super::traits::{BackendOptions, BackendProvider, BackendStats, CacheBackend, CacheEntry};
use crate::config::PathsConfig;
use crate::error::{PictorError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Bumped whenever the table layout changes. Databases carrying any other
/// non-zero version fail to open and are rebuilt by the recovery path.
const SCHEMA_VERSION: i32 = 2;

/// SQLite-backed blob store for one namespace.
///
/// Thread-safe via an internal mutex on the connection, which also makes it
/// the single writer for its file.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    options: BackendOptions,
    path: PathBuf,
}

impl SqliteBackend {
    /// Open or create a cache database at `db_path`.
    pub fn open(db_path: impl AsRef<Path>, options: BackendOptions) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PictorError::Io {
                message: format!("Failed to create cache directory: {}", e),
                path: Some(parent.to_path_buf()),
                source: Some(e),
            })?;
        }

        let conn = Connection::open(db_path).map_err(|e| PictorError::Database {
            message: format!("Failed to open cache database: {}", e),
            source: Some(e),
        })?;

        // A file that is not a database fails here, on first read.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| PictorError::Database {
                message: format!("Failed to set pragmas: {}", e),
                source: Some(e),
            })?;

        init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            options,
            path: db_path.to_path_buf(),
        })
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| PictorError::Database {
            message: format!("Failed to lock database: {}", e),
            source: None,
        })
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    let integrity: String = conn
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .map_err(|e| PictorError::Database {
            message: format!("Failed integrity check: {}", e),
            source: Some(e),
        })?;
    if integrity != "ok" {
        return Err(PictorError::Database {
            message: format!("Cache database is corrupt: {}", integrity),
            source: None,
        });
    }

    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version != 0 && version != SCHEMA_VERSION {
        return Err(PictorError::Database {
            message: format!(
                "Incompatible cache schema version {} (expected {})",
                version, SCHEMA_VERSION
            ),
            source: None,
        });
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS cache_entries (
            key TEXT PRIMARY KEY,
            value BLOB NOT NULL,
            fetched_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            size_bytes INTEGER NOT NULL,
            seq INTEGER NOT NULL
        );

        -- Index for expiration queries
        CREATE INDEX IF NOT EXISTS idx_cache_expires
            ON cache_entries(expires_at);

        -- Index for eviction order
        CREATE INDEX IF NOT EXISTS idx_cache_fetched
            ON cache_entries(fetched_at, seq);
        "#,
    )
    .map_err(|e| PictorError::Database {
        message: format!("Failed to initialize cache schema: {}", e),
        source: Some(e),
    })?;

    if version == 0 {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }

    Ok(())
}

/// Timestamps are stored as microseconds since the epoch and compared
/// numerically. Every `DateTime<Utc>` up to `MAX_UTC` fits in an `i64`.
fn to_db_time(time: DateTime<Utc>) -> i64 {
    time.timestamp_micros()
}

fn from_db_time(micros: i64, fallback: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or(fallback)
}

impl CacheBackend for SqliteBackend {
    fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let conn = self.lock()?;
        let now = Utc::now();

        let row: Option<(Vec<u8>, i64, i64, i64)> = conn
            .query_row(
                r#"
                SELECT value, fetched_at, expires_at, size_bytes
                FROM cache_entries
                WHERE key = ?1 AND expires_at > ?2
                "#,
                params![key, to_db_time(now)],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .map_err(|e| PictorError::Database {
                message: format!("Failed to query cache entry: {}", e),
                source: Some(e),
            })?;

        Ok(row.map(|(payload, fetched_at, expires_at, size_bytes)| CacheEntry {
            key: key.to_string(),
            payload,
            fetched_at: from_db_time(fetched_at, now),
            expires_at: from_db_time(expires_at, now),
            size_bytes: size_bytes as u64,
        }))
    }

    fn put(&self, key: &str, value: &[u8], fetched_at: DateTime<Utc>) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT OR REPLACE INTO cache_entries
            (key, value, fetched_at, expires_at, size_bytes, seq)
            VALUES (?1, ?2, ?3, ?4, ?5,
                    (SELECT COALESCE(MAX(seq), 0) + 1 FROM cache_entries))
            "#,
            params![
                key,
                value,
                to_db_time(fetched_at),
                to_db_time(self.options.expires_at(fetched_at)),
                value.len() as i64,
            ],
        )
        .map_err(|e| PictorError::Database {
            message: format!("Failed to set cache entry: {}", e),
            source: Some(e),
        })?;

        let count: i64 = tx.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| {
            row.get(0)
        })?;
        let excess = count - self.options.max_entries as i64;

        let evicted = if excess > 0 {
            tx.execute(
                r#"
                DELETE FROM cache_entries WHERE key IN (
                    SELECT key FROM cache_entries
                    WHERE key != ?1
                    ORDER BY fetched_at ASC, seq ASC
                    LIMIT ?2
                )
                "#,
                params![key, excess],
            )
            .map_err(|e| PictorError::Database {
                message: format!("Failed to evict cache entries: {}", e),
                source: Some(e),
            })?
        } else {
            0
        };

        tx.commit()?;

        if evicted > 0 {
            debug!(
                "Evicted {} entries from {} to stay under {} entries",
                evicted,
                self.path.display(),
                self.options.max_entries
            );
        }

        Ok(evicted)
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])
            .map_err(|e| PictorError::Database {
                message: format!("Failed to remove cache entry: {}", e),
                source: Some(e),
            })?;
        Ok(deleted > 0)
    }

    fn clear(&self) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn
            .execute("DELETE FROM cache_entries", [])
            .map_err(|e| PictorError::Database {
                message: format!("Failed to clear cache entries: {}", e),
                source: Some(e),
            })?;
        debug!("Cleared {} entries from {}", deleted, self.path.display());
        Ok(deleted)
    }

    fn sweep_expired(&self) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM cache_entries WHERE expires_at <= ?1",
                params![to_db_time(Utc::now())],
            )
            .map_err(|e| PictorError::Database {
                message: format!("Failed to sweep expired entries: {}", e),
                source: Some(e),
            })?;
        if deleted > 0 {
            debug!("Swept {} expired cache entries", deleted);
        }
        Ok(deleted)
    }

    fn stats(&self) -> Result<BackendStats> {
        let conn = self.lock()?;
        let (count, size): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0) FROM cache_entries",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(BackendStats {
            entry_count: count as usize,
            total_size_bytes: size as u64,
        })
    }

    fn options(&self) -> BackendOptions {
        self.options
    }
}

/// Opens one SQLite database per namespace under a cache directory.
#[derive(Debug, Clone)]
pub struct SqliteProvider {
    cache_dir: PathBuf,
}

impl SqliteProvider {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Database file backing `namespace`.
    pub fn db_path(&self, namespace: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{}", namespace, PathsConfig::DATABASE_EXTENSION))
    }
}

impl BackendProvider for SqliteProvider {
    fn open(&self, namespace: &str, options: &BackendOptions) -> Result<Arc<dyn CacheBackend>> {
        let backend = SqliteBackend::open(self.db_path(namespace), *options).map_err(|e| {
            PictorError::BackendOpenFailed {
                namespace: namespace.to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(Arc::new(backend))
    }

    fn delete_all(&self, namespace: &str) -> Result<()> {
        let db_path = self.db_path(namespace);
        let mut files = vec![db_path.clone()];
        for suffix in ["-wal", "-shm"] {
            let mut name = db_path.clone().into_os_string();
            name.push(suffix);
            files.push(PathBuf::from(name));
        }

        for file in files {
            match std::fs::remove_file(&file) {
                Ok(()) => debug!("Removed cache file {}", file.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(PictorError::BackendClearFailed {
                        namespace: namespace.to_string(),
                        message: format!("{}: {}", file.display(), e),
                    })
                }
            }
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "sqlite"
    }
}
