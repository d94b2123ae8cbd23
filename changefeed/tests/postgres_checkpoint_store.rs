#![cfg(feature = "test-utils")]

use changefeed::error::ErrorKind;
use changefeed::registry::RangeRegistry;
use changefeed::source::MemorySource;
use changefeed::store::CheckpointStore;
use changefeed::store::backend::{CheckpointBackend, ConfiguredCheckpointBackend};
use changefeed::test_utils::database::{drop_checkpoint_database, spawn_checkpoint_database};
use changefeed::types::{COMPLETION_MARKER, Checkpoint, RangeId, ResumeToken, TargetId};
use changefeed_config::shared::CheckpointStoreConfig;
use changefeed_telemetry::tracing::init_test_tracing;

async fn registry_with_ranges(target: &str, ranges: &[&str]) -> RangeRegistry<MemorySource> {
    let source = MemorySource::new();
    source.add_ranges(target, ranges.iter().copied()).await;

    RangeRegistry::new(source)
}

#[tokio::test(flavor = "multi_thread")]
async fn upserts_replace_the_stored_token() {
    init_test_tracing();

    let (config, backend) = spawn_checkpoint_database().await;
    let target = TargetId::new("shop.orders");
    let range = RangeId::new("a");

    backend.upsert(&target, &range, None).await.unwrap();
    assert_eq!(
        backend.read_all(&target).await.unwrap(),
        vec![(range.clone(), None)]
    );

    let token = ResumeToken::new("42");
    backend.upsert(&target, &range, Some(&token)).await.unwrap();
    assert_eq!(
        backend.read_all(&target).await.unwrap(),
        vec![(range.clone(), Some(token))]
    );

    // Rows are scoped by target.
    assert!(
        backend
            .read_all(&TargetId::new("shop.customers"))
            .await
            .unwrap()
            .is_empty()
    );

    drop_checkpoint_database(&config).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn checkpoints_are_created_once_and_survive_a_restart() {
    init_test_tracing();

    let (config, backend) = spawn_checkpoint_database().await;
    let target = TargetId::new("shop.orders");
    let registry = registry_with_ranges("shop.orders", &["b", "a"]).await;

    let store = CheckpointStore::new(backend.clone());
    store.initialize(&target, &registry).await.unwrap();

    let rows = backend.read_all(&target).await.unwrap();
    let ranges = rows.iter().map(|(range, _)| range.as_str()).collect::<Vec<_>>();
    assert_eq!(ranges, vec!["a", "b", COMPLETION_MARKER]);

    store
        .set_token(&target, &RangeId::new("a"), ResumeToken::new("7"))
        .await
        .unwrap();

    let restarted = CheckpointStore::new(backend.clone());
    restarted.initialize(&target, &registry).await.unwrap();
    assert_eq!(
        restarted
            .get_token(&target, &RangeId::new("a"))
            .await
            .unwrap(),
        Checkpoint::Resume(ResumeToken::new("7"))
    );
    assert_eq!(
        restarted
            .get_token(&target, &RangeId::new("b"))
            .await
            .unwrap(),
        Checkpoint::StartOfStream
    );

    drop_checkpoint_database(&config).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn interrupted_initialization_is_detected() {
    init_test_tracing();

    let (config, backend) = spawn_checkpoint_database().await;
    let target = TargetId::new("shop.orders");
    backend
        .upsert(&target, &RangeId::new("a"), None)
        .await
        .unwrap();

    let registry = registry_with_ranges("shop.orders", &["a", "b"]).await;
    let store = CheckpointStore::new(backend.clone());
    let err = store.initialize(&target, &registry).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CorruptCheckpoints);
    assert_eq!(backend.read_all(&target).await.unwrap().len(), 1);

    drop_checkpoint_database(&config).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn configured_postgres_backend_shares_the_migrated_table() {
    init_test_tracing();

    let (config, backend) = spawn_checkpoint_database().await;
    let configured = ConfiguredCheckpointBackend::from_config(&CheckpointStoreConfig::Postgres {
        connection: config.clone(),
    })
    .await
    .unwrap();
    assert!(matches!(
        configured,
        ConfiguredCheckpointBackend::Postgres(_)
    ));

    let target = TargetId::new("shop.orders");
    let token = ResumeToken::new("3");
    configured
        .upsert(&target, &RangeId::new("a"), Some(&token))
        .await
        .unwrap();
    assert_eq!(
        backend.read_all(&target).await.unwrap(),
        vec![(RangeId::new("a"), Some(token))]
    );

    drop_checkpoint_database(&config).await;
}
