//! Integration tests for CacheStore on the SQLite backend.
//!
//! Uses wiremock for HTTP so fetch counts can be asserted on the server side.

use pictor_core::{
    CacheConfig, CacheStore, HttpFetcher, PictorError, ResourceKind, ResourceLoader,
    SqliteProvider,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn open_store(provider: &SqliteProvider, config: &CacheConfig) -> CacheStore {
    let fetcher = Arc::new(HttpFetcher::new().expect("failed to create fetcher"));
    CacheStore::open(config, provider, fetcher).expect("failed to open store")
}

async fn mount_image(server: &MockServer, route: &str, body: &'static [u8], hits: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .expect(hits)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_second_get_does_not_hit_network() {
    let server = MockServer::start().await;
    mount_image(&server, "/a.png", b"png-bytes", 1).await;

    let temp = TempDir::new().unwrap();
    let provider = SqliteProvider::new(temp.path());
    let store = open_store(&provider, &CacheConfig::new("images"));

    let url = format!("{}/a.png", server.uri());
    assert_eq!(store.get(&url).await.unwrap().as_ref(), b"png-bytes");
    assert_eq!(store.get(&url).await.unwrap().as_ref(), b"png-bytes");
}

#[tokio::test]
async fn test_unbounded_stale_period_still_serves_from_cache() {
    let server = MockServer::start().await;
    mount_image(&server, "/forever.png", b"forever", 1).await;

    let temp = TempDir::new().unwrap();
    let provider = SqliteProvider::new(temp.path());
    let store = open_store(
        &provider,
        &CacheConfig::new("images").with_stale_period(Duration::MAX),
    );

    let url = format!("{}/forever.png", server.uri());
    assert_eq!(store.get(&url).await.unwrap().as_ref(), b"forever");
    assert_eq!(store.get(&url).await.unwrap().as_ref(), b"forever");
}

#[tokio::test]
async fn test_cache_survives_process_restart() {
    let server = MockServer::start().await;
    mount_image(&server, "/b.png", b"kept", 1).await;

    let temp = TempDir::new().unwrap();
    let provider = SqliteProvider::new(temp.path());
    let url = format!("{}/b.png", server.uri());

    {
        let store = open_store(&provider, &CacheConfig::new("images"));
        store.get(&url).await.unwrap();
    }

    let store = open_store(&provider, &CacheConfig::new("images"));
    assert!(!store.is_degraded());
    assert_eq!(store.get(&url).await.unwrap().as_ref(), b"kept");
}

#[tokio::test]
async fn test_failed_fetch_leaves_no_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let provider = SqliteProvider::new(temp.path());
    let store = open_store(&provider, &CacheConfig::new("images"));

    let err = store
        .get(&format!("{}/c.png", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, PictorError::FetchFailed { status: Some(503), .. }));
    assert_eq!(store.stats().unwrap().entry_count, 0);
}

#[tokio::test]
async fn test_eviction_triggers_refetch() {
    let server = MockServer::start().await;
    mount_image(&server, "/1.png", b"one", 2).await;
    mount_image(&server, "/2.png", b"two", 1).await;
    mount_image(&server, "/3.png", b"three", 1).await;

    let temp = TempDir::new().unwrap();
    let provider = SqliteProvider::new(temp.path());
    let store = open_store(&provider, &CacheConfig::new("images").with_max_entries(2));

    for name in ["1", "2", "3"] {
        store
            .get(&format!("{}/{}.png", server.uri(), name))
            .await
            .unwrap();
    }
    assert_eq!(store.stats().unwrap().entry_count, 2);

    // "1" was the least recently fetched, so it is fetched again
    store
        .get(&format!("{}/1.png", server.uri()))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_corrupt_database_recovers_to_backup_namespace() {
    let server = MockServer::start().await;
    mount_image(&server, "/d.png", b"fresh", 1).await;

    let temp = TempDir::new().unwrap();
    let provider = SqliteProvider::new(temp.path());
    std::fs::write(provider.db_path("images"), vec![0x5A; 8192]).unwrap();

    let store = open_store(&provider, &CacheConfig::new("images").with_max_entries(3));

    assert!(store.is_degraded());
    assert_eq!(store.namespace(), "images_backup");
    assert!(!provider.db_path("images").exists());
    assert!(provider.db_path("images_backup").exists());

    let stats = store.stats().unwrap();
    assert_eq!(stats.max_entries, CacheConfig::DEFAULT_MAX_ENTRIES);
    assert!(stats.degraded);

    let url = format!("{}/d.png", server.uri());
    assert_eq!(store.get(&url).await.unwrap().as_ref(), b"fresh");
    assert_eq!(store.get(&url).await.unwrap().as_ref(), b"fresh");
}

#[tokio::test]
async fn test_unusable_backup_location_is_fatal() {
    let temp = TempDir::new().unwrap();
    // A regular file where the cache directory should be
    let blocked = temp.path().join("not-a-dir");
    std::fs::write(&blocked, b"").unwrap();
    let provider = SqliteProvider::new(&blocked);

    let result = CacheStore::open(
        &CacheConfig::new("images"),
        &provider,
        Arc::new(HttpFetcher::new().unwrap()),
    );
    assert!(matches!(
        result,
        Err(PictorError::BackupBackendOpenFailed { .. })
    ));
}

#[tokio::test]
async fn test_loader_routes_by_kind() {
    let server = MockServer::start().await;
    mount_image(&server, "/logo.png", b"remote-logo", 1).await;

    let temp = TempDir::new().unwrap();
    let assets = temp.path().join("bundle");
    std::fs::create_dir_all(assets.join("assets/images")).unwrap();
    std::fs::write(assets.join("assets/images/logo.png"), b"local-logo").unwrap();

    let provider = SqliteProvider::new(temp.path().join("cache"));
    let store = Arc::new(open_store(&provider, &CacheConfig::new("images")));
    let loader = ResourceLoader::new(store).with_asset_root(&assets);

    let remote = loader
        .load(&format!("{}/logo.png", server.uri()))
        .await
        .unwrap();
    assert_eq!(remote.kind, ResourceKind::NetworkImage);
    assert_eq!(remote.bytes.as_ref(), b"remote-logo");

    let local = loader.load("assets/images/logo.png").await.unwrap();
    assert_eq!(local.kind, ResourceKind::RasterAsset);
    assert_eq!(local.bytes.as_ref(), b"local-logo");
}
