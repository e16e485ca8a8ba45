//! Resolve a locator to bytes tagged with their kind.
//!
//! Network locators go through the [`CacheStore`]; everything else is read
//! from disk. Decoding the bytes is left to the caller.

use super::kind::{classify, ResourceKind};
use crate::cache::CacheStore;
use crate::error::{PictorError, Result};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Bytes ready to hand to a decoder.
#[derive(Debug, Clone)]
pub struct LoadedResource {
    pub locator: String,
    pub kind: ResourceKind,
    pub bytes: Bytes,
}

/// Loads resources of every kind.
#[derive(Clone)]
pub struct ResourceLoader {
    cache: Arc<CacheStore>,
    /// Base directory for relative (bundled asset) locators.
    asset_root: PathBuf,
}

impl ResourceLoader {
    pub fn new(cache: Arc<CacheStore>) -> Self {
        Self {
            cache,
            asset_root: PathBuf::from("."),
        }
    }

    pub fn with_asset_root(mut self, asset_root: impl Into<PathBuf>) -> Self {
        self.asset_root = asset_root.into();
        self
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Classify `locator` and fetch or read its bytes.
    pub async fn load(&self, locator: &str) -> Result<LoadedResource> {
        let kind = classify(locator);

        let bytes = if kind.is_remote() {
            self.cache.get(locator).await?
        } else {
            let path = self.resolve_path(locator);
            debug!("Reading {} resource from {}", kind, path.display());
            read_file(&path).await?
        };

        Ok(LoadedResource {
            locator: locator.to_string(),
            kind,
            bytes,
        })
    }

    /// Filesystem path a non-network locator refers to.
    pub fn resolve_path(&self, locator: &str) -> PathBuf {
        let path = Path::new(locator);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.asset_root.join(path)
        }
    }
}

async fn read_file(path: &Path) -> Result<Bytes> {
    match tokio::fs::read(path).await {
        Ok(data) => Ok(Bytes::from(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(PictorError::ResourceNotFound(path.to_path_buf()))
        }
        Err(e) => Err(PictorError::io_with_path(e, path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, MemoryProvider};
    use crate::network::ByteFetcher;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct FixedFetcher;

    #[async_trait]
    impl ByteFetcher for FixedFetcher {
        async fn fetch(&self, _locator: &str) -> Result<Bytes> {
            Ok(Bytes::from_static(b"remote"))
        }
    }

    fn loader(asset_root: &Path) -> ResourceLoader {
        let store = CacheStore::open(
            &CacheConfig::new("loader_test"),
            &MemoryProvider::new(),
            Arc::new(FixedFetcher),
        )
        .unwrap();
        ResourceLoader::new(Arc::new(store)).with_asset_root(asset_root)
    }

    #[tokio::test]
    async fn test_network_locator_uses_cache() {
        let temp = TempDir::new().unwrap();
        let loader = loader(temp.path());

        let loaded = loader.load("https://example.com/image.png").await.unwrap();
        assert_eq!(loaded.kind, ResourceKind::NetworkImage);
        assert_eq!(loaded.bytes.as_ref(), b"remote");
        assert_eq!(loader.cache().stats().unwrap().entry_count, 1);
    }

    #[tokio::test]
    async fn test_relative_locator_reads_from_asset_root() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("assets/icons")).unwrap();
        std::fs::write(temp.path().join("assets/icons/icon.svg"), b"<svg/>").unwrap();

        let loaded = loader(temp.path())
            .load("assets/icons/icon.svg")
            .await
            .unwrap();
        assert_eq!(loaded.kind, ResourceKind::VectorGraphic);
        assert_eq!(loaded.bytes.as_ref(), b"<svg/>");
    }

    #[tokio::test]
    async fn test_absolute_locator_ignores_asset_root() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("spinner.json");
        std::fs::write(&file, b"{}").unwrap();

        let loader = loader(Path::new("/nonexistent-root"));
        let loaded = loader.load(file.to_str().unwrap()).await.unwrap();
        assert_eq!(loaded.kind, ResourceKind::Animation);
        assert_eq!(loaded.bytes.as_ref(), b"{}");
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let temp = TempDir::new().unwrap();
        let err = loader(temp.path())
            .load("assets/images/missing.png")
            .await
            .unwrap_err();
        assert!(matches!(err, PictorError::ResourceNotFound(path)
            if path == temp.path().join("assets/images/missing.png")));
    }
}
