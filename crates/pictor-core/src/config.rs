//! Centralized configuration constants for Pictor.
//!
//! Tunable per-store settings live in [`crate::cache::CacheConfig`]; this
//! module holds the fixed values shared by the network and path layers.

use std::time::Duration;

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    pub const USER_AGENT: &'static str = concat!("Pictor/", env!("CARGO_PKG_VERSION"));
}

/// Shared directory and file naming.
pub struct PathsConfig;

impl PathsConfig {
    pub const CACHE_DIR_NAME: &'static str = "pictor";
    pub const DATABASE_EXTENSION: &'static str = "sqlite";
    pub const BACKUP_NAMESPACE_SUFFIX: &'static str = "_backup";
    pub const DEFAULT_NAMESPACE: &'static str = "pictor_image_cache";
}
