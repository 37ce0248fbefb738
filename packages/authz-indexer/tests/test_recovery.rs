//! Integration tests for the recovery daemon
//!
//! - Minimum age of eligible items
//! - Unsupported document types
//! - Circuit breaker and loop limit
//! - Scheduled loop with cancellation

use async_trait::async_trait;
use authz_indexer::{
    AuthorizationDoc, BulkOp, IndexType, IndexerConfig, IndexerError, PermissionIndexer,
    RecoveryConfig, RecoveryIndexer, ResilientIndexer, ScopeRegistry, SearchBackend,
    TantivyAuthorizationIndex,
};
use authz_storage::{EsQueueItem, Qualifier, RecoveryQueue, SqliteAuthorizationStore};
use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct UnavailableBackend {
    applies: AtomicUsize,
}

#[async_trait]
impl SearchBackend for UnavailableBackend {
    async fn apply(&self, _index_type: &IndexType, _ops: &[BulkOp]) -> authz_indexer::Result<()> {
        self.applies.fetch_add(1, Ordering::SeqCst);
        Err(IndexerError::search("cluster unavailable"))
    }

    async fn get(&self, _index_type: &IndexType, _id: &str) -> authz_indexer::Result<Option<AuthorizationDoc>> {
        Ok(None)
    }

    async fn count(&self, _index_type: &IndexType) -> authz_indexer::Result<usize> {
        Ok(0)
    }
}

fn recovery_config(batch_size: usize, loop_limit: usize) -> RecoveryConfig {
    RecoveryConfig {
        min_age_ms: 60_000,
        batch_size,
        loop_limit,
        initial_delay_ms: 0,
        interval_ms: 20,
        circuit_breaker_ratio: 0.7,
    }
}

fn daemon(
    store: Arc<SqliteAuthorizationStore>,
    backend: Arc<dyn SearchBackend>,
    config: RecoveryConfig,
) -> RecoveryIndexer {
    let indexer = Arc::new(PermissionIndexer::new(
        store.clone(),
        store.clone(),
        backend,
        Arc::new(ScopeRegistry::default_scopes().unwrap()),
        &IndexerConfig::default(),
    ));
    RecoveryIndexer::new(store, vec![indexer as Arc<dyn ResilientIndexer>], config)
}

fn old_item(doc_type: &str, entity: &str) -> EsQueueItem {
    EsQueueItem::create(doc_type, format!("auth_{}", entity), Some(entity.into()), entity)
        .at(Utc::now() - Duration::minutes(10))
}

async fn all_items(store: &SqliteAuthorizationStore) -> Vec<EsQueueItem> {
    store
        .select_for_recovery(Utc::now() + Duration::minutes(1), 1000)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_recover_only_old_enough_items() {
    let store = Arc::new(SqliteAuthorizationStore::in_memory().unwrap());
    store.insert_project("P1", "p1", Qualifier::Project, false).unwrap();
    store.insert_project("P2", "p2", Qualifier::Project, false).unwrap();
    let fresh = EsQueueItem::create("issues/auth", "auth_P2", Some("P2".into()), "P2");
    store
        .insert(&[old_item("issues/auth", "P1"), fresh.clone()])
        .await
        .unwrap();
    let index = Arc::new(TantivyAuthorizationIndex::in_ram().unwrap());
    let recovery = daemon(store.clone(), index.clone(), recovery_config(10, 100));

    let result = recovery.recover().await.unwrap();

    assert!(result.is_success());
    let issues = IndexType::authorization("issues");
    assert!(index.get(&issues, "auth_P1").await.unwrap().is_some());
    assert!(index.get(&issues, "auth_P2").await.unwrap().is_none());
    let pending = all_items(&store).await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].uuid, fresh.uuid);
}

#[tokio::test]
async fn test_unsupported_doc_type_is_recorded_as_failed() {
    let store = Arc::new(SqliteAuthorizationStore::in_memory().unwrap());
    store.insert(&[old_item("rules/rule", "R1")]).await.unwrap();
    let recovery = daemon(
        store.clone(),
        Arc::new(TantivyAuthorizationIndex::in_ram().unwrap()),
        recovery_config(10, 100),
    );

    let result = recovery.recover().await.unwrap();

    assert_eq!(result.failures(), 1);
    let pending = all_items(&store).await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempts, 1);

    // cursor moved, a new pass does not see it before min_age
    let result = recovery.recover().await.unwrap();
    assert_eq!(result.total(), 0);
}

#[tokio::test]
async fn test_circuit_breaker_stops_the_pass() {
    let store = Arc::new(SqliteAuthorizationStore::in_memory().unwrap());
    let items: Vec<_> = (0..6)
        .map(|i| old_item("components/auth", &format!("P{}", i)))
        .collect();
    store.insert(&items).await.unwrap();
    let backend = Arc::new(UnavailableBackend {
        applies: AtomicUsize::new(0),
    });
    let recovery = daemon(store.clone(), backend.clone(), recovery_config(2, 100));

    let result = recovery.recover().await.unwrap();

    assert_eq!(result.total(), 2);
    assert_eq!(result.successes(), 0);
    assert_eq!(backend.applies.load(Ordering::SeqCst), 1);
    let attempts: Vec<u32> = all_items(&store).await.iter().map(|i| i.attempts).collect();
    assert_eq!(attempts.iter().filter(|a| **a == 1).count(), 2);
    assert_eq!(attempts.iter().filter(|a| **a == 0).count(), 4);
}

#[tokio::test]
async fn test_loop_limit_bounds_a_pass() {
    let store = Arc::new(SqliteAuthorizationStore::in_memory().unwrap());
    let items: Vec<_> = (0..10)
        .map(|i| old_item("components/auth", &format!("P{}", i)))
        .collect();
    store.insert(&items).await.unwrap();
    let recovery = daemon(
        store.clone(),
        Arc::new(TantivyAuthorizationIndex::in_ram().unwrap()),
        recovery_config(2, 3),
    );

    let result = recovery.recover().await.unwrap();

    // two batches of two reach the limit of three
    assert_eq!(result.total(), 4);
    assert!(result.is_success());
    assert_eq!(store.count().await.unwrap(), 6);
}

#[tokio::test]
async fn test_drains_whole_queue_in_batches() {
    let store = Arc::new(SqliteAuthorizationStore::in_memory().unwrap());
    for i in 0..7 {
        let uuid = format!("P{}", i);
        store.insert_project(&uuid, &uuid, Qualifier::Project, i % 2 == 0).unwrap();
    }
    let items: Vec<_> = (0..7)
        .flat_map(|i| {
            let uuid = format!("P{}", i);
            vec![old_item("issues/auth", &uuid), old_item("components/auth", &uuid)]
        })
        .collect();
    store.insert(&items).await.unwrap();
    let index = Arc::new(TantivyAuthorizationIndex::in_ram().unwrap());
    let recovery = daemon(store.clone(), index.clone(), recovery_config(3, 100));

    let result = recovery.recover().await.unwrap();

    assert!(result.is_success());
    assert_eq!(store.count().await.unwrap(), 0);
    assert_eq!(index.count(&IndexType::authorization("issues")).await.unwrap(), 7);
    assert_eq!(index.count(&IndexType::authorization("components")).await.unwrap(), 7);
}

#[tokio::test]
async fn test_run_until_cancelled() {
    let store = Arc::new(SqliteAuthorizationStore::in_memory().unwrap());
    store.insert_project("P1", "p1", Qualifier::Project, false).unwrap();
    store.insert(&[old_item("issues/auth", "P1")]).await.unwrap();
    let recovery = Arc::new(daemon(
        store.clone(),
        Arc::new(TantivyAuthorizationIndex::in_ram().unwrap()),
        recovery_config(10, 100),
    ));

    let shutdown = CancellationToken::new();
    let handle = {
        let recovery = recovery.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { recovery.run(shutdown).await })
    };

    for _ in 0..100 {
        if store.count().await.unwrap() == 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(store.count().await.unwrap(), 0);
}
