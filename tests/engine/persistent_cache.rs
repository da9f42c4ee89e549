use std::sync::Arc;
use std::time::Duration;

use fetchkit::{BoxError, CacheConfig, EffectiveConfig, RequestConfig, SledBackend, StorageKind};
use serde_json::Value;

use crate::common::{ScriptedTransport, Step, builder};

fn persistent_cache() -> CacheConfig {
    CacheConfig {
        enabled: true,
        ttl: Duration::from_secs(30),
        storage: StorageKind::Persistent,
        ..CacheConfig::default()
    }
}

#[tokio::test]
async fn sled_backend_serves_repeat_calls() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(ScriptedTransport::new(Step::Respond(200, r#"{"cached":true}"#)));
    let client = builder(&transport)
        .cache(persistent_cache())
        .persistent_cache_dir(dir.path().join("cache"))
        .build()
        .unwrap();

    let first: Value = client.get("/data").await.unwrap();
    let second: Value = client.get("/data").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(transport.calls(), 1);

    client.clear_cache().await;
    let _: Value = client.get("/data").await.unwrap();
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn memory_and_persistent_entries_are_separate() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(ScriptedTransport::new(Step::Respond(200, "1")));
    let client = builder(&transport)
        .cache(persistent_cache())
        .persistent_cache_dir(dir.path())
        .build()
        .unwrap();

    let _: Value = client.get("/data").await.unwrap();
    let _: Value = client
        .execute("/data", RequestConfig::new().cache_storage(StorageKind::Memory))
        .await
        .unwrap();
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn full_backend_does_not_fail_requests() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(ScriptedTransport::new(Step::Respond(200, "1")));
    let client = builder(&transport)
        .cache(persistent_cache())
        .persistent_cache_dir(dir.path())
        .persistent_capacity(1)
        .build()
        .unwrap();

    let _: Value = client.get("/a").await.unwrap();
    // quota reached: served, but not stored
    let _: Value = client.get("/b").await.unwrap();
    let _: Value = client.get("/b").await.unwrap();
    assert_eq!(transport.calls(), 3);

    let _: Value = client.get("/a").await.unwrap();
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn interceptors_cannot_move_an_entry_between_backends() {
    let db = sled::Config::new().temporary(true).open().unwrap();
    let transport = Arc::new(ScriptedTransport::new(Step::Respond(200, "1")));
    let client = builder(&transport)
        .cache_ttl(Duration::from_secs(30))
        .persistent_backend(Arc::new(SledBackend::from_db(db.clone())))
        .build()
        .unwrap();
    client.add_request_interceptor(|mut c: EffectiveConfig| -> Result<EffectiveConfig, BoxError> {
        c.cache.storage = StorageKind::Persistent;
        Ok(c)
    });

    let _: Value = client.get("/x").await.unwrap();
    let _: Value = client.get("/x").await.unwrap();
    assert_eq!(transport.calls(), 1);
    // the entry lives where its key was derived for: memory
    assert!(db.is_empty());

    client.clear_cache().await;
    let _: Value = client.get("/x").await.unwrap();
    assert_eq!(transport.calls(), 2);
    assert!(db.is_empty());
}
