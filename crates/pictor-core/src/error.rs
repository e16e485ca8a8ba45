//! Error types for Pictor.
//!
//! Only `FetchFailed` and `BackupBackendOpenFailed` ever escape the cache
//! store. The remaining cache variants are produced by backends and absorbed
//! by the recovery path in [`crate::cache::CacheStore::open`].

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the Pictor library.
#[derive(Debug, Error)]
pub enum PictorError {
    // Network errors
    #[error("Fetch failed for {locator}: {message}")]
    FetchFailed {
        locator: String,
        message: String,
        /// HTTP status, when the server answered at all
        status: Option<u16>,
    },

    // Cache lifecycle errors
    #[error("Failed to open cache backend '{namespace}': {message}")]
    BackendOpenFailed { namespace: String, message: String },

    #[error("Failed to clear cache backend '{namespace}': {message}")]
    BackendClearFailed { namespace: String, message: String },

    #[error("Failed to open backup cache backend '{namespace}': {message}")]
    BackupBackendOpenFailed { namespace: String, message: String },

    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Resource not found: {0}")]
    ResourceNotFound(PathBuf),

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for Pictor operations.
pub type Result<T> = std::result::Result<T, PictorError>;

impl From<std::io::Error> for PictorError {
    fn from(err: std::io::Error) -> Self {
        PictorError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for PictorError {
    fn from(err: serde_json::Error) -> Self {
        PictorError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for PictorError {
    fn from(err: rusqlite::Error) -> Self {
        PictorError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl PictorError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        PictorError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a fetch failure for a locator.
    pub fn fetch_failed(locator: &str, message: impl Into<String>, status: Option<u16>) -> Self {
        PictorError::FetchFailed {
            locator: locator.to_string(),
            message: message.into(),
            status,
        }
    }

    /// Check if a caller could reasonably retry this error.
    ///
    /// The cache store itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            PictorError::FetchFailed { status: None, .. } => true,
            PictorError::FetchFailed {
                status: Some(code), ..
            } => matches!(code, 408 | 429 | 500 | 502 | 503 | 504),
            _ => false,
        }
    }
}
