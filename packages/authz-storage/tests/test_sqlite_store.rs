//! Integration tests for the SQLite authorization store
//!
//! Tests persistence on disk with:
//! - Reopening a database file
//! - Group deletion cascading to grants
//! - Queue surviving a restart

use authz_storage::{
    AuthorizationReader, ErrorKind, EsQueueItem, Qualifier, RecoveryQueue, RowGrant,
    SqliteAuthorizationStore, MAX_AUTHORIZATION_QUERY_UUIDS, USER_PERMISSION,
};
use chrono::{Duration, SubsecRound, Utc};
use tempfile::TempDir;

#[tokio::test]
async fn test_store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("authz.db");

    {
        let store = SqliteAuthorizationStore::new(&db_path).expect("Failed to open store");
        store
            .insert_project("P1", "p1", Qualifier::Project, true)
            .unwrap();
        store.grant_user("P1", "U1", USER_PERMISSION).unwrap();
        store
            .insert(&[EsQueueItem::create("issues/auth", "auth_P1", Some("P1".into()), "P1")])
            .await
            .unwrap();
    }

    let store = SqliteAuthorizationStore::new(&db_path).expect("Failed to reopen store");
    let rows = store.select_authorizations(&[]).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_deleted_group_loses_its_grants() {
    let store = SqliteAuthorizationStore::in_memory().unwrap();
    store
        .insert_project("P1", "p1", Qualifier::Project, true)
        .unwrap();
    store.insert_group("G1", "devs").unwrap();
    store.insert_group("G2", "ops").unwrap();
    store.grant_group("P1", Some("G1"), USER_PERMISSION).unwrap();
    store.grant_group("P1", Some("G2"), USER_PERMISSION).unwrap();

    store.delete_group("G1").unwrap();

    let rows = store.select_authorizations(&[]).await.unwrap();
    let groups: Vec<_> = rows
        .iter()
        .filter_map(|r| match &r.grant {
            RowGrant::Group(g) => Some(g.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(groups, vec!["G2"]);

    assert!(store.delete_group("G1").is_err());
}

#[tokio::test]
async fn test_revocations() {
    let store = SqliteAuthorizationStore::in_memory().unwrap();
    store
        .insert_project("A1", "a1", Qualifier::Application, true)
        .unwrap();
    store.insert_group("G1", "devs").unwrap();
    store.grant_user("A1", "U1", USER_PERMISSION).unwrap();
    store.grant_group("A1", Some("G1"), USER_PERMISSION).unwrap();

    store.revoke_user("A1", "U1", USER_PERMISSION).unwrap();
    store.revoke_group("A1", "G1", USER_PERMISSION).unwrap();

    let rows = store.select_authorizations(&[]).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].grant, RowGrant::Nobody);
    assert_eq!(rows[0].qualifier, Qualifier::Application);
}

#[tokio::test]
async fn test_filter_with_many_entities() {
    let store = SqliteAuthorizationStore::in_memory().unwrap();
    let uuids: Vec<String> = (0..250).map(|i| format!("P{:04}", i)).collect();
    for uuid in &uuids {
        store
            .insert_project(uuid, uuid, Qualifier::Project, false)
            .unwrap();
    }

    // 250 uuids bound four times stays under SQLite's parameter limit
    let rows = store.select_authorizations(&uuids).await.unwrap();
    assert_eq!(rows.len(), 250);
    assert!(rows.iter().all(|r| r.grant == RowGrant::Anyone));
}

#[tokio::test]
async fn test_filter_at_the_parameter_limit() {
    let store = SqliteAuthorizationStore::in_memory().unwrap();
    store
        .insert_project("P1", "p1", Qualifier::Project, false)
        .unwrap();
    assert_eq!(store.max_entity_uuids(), MAX_AUTHORIZATION_QUERY_UUIDS);

    let mut uuids: Vec<String> = (1..MAX_AUTHORIZATION_QUERY_UUIDS)
        .map(|i| format!("gone-{}", i))
        .collect();
    uuids.push("P1".into());
    let rows = store.select_authorizations(&uuids).await.unwrap();
    assert_eq!(rows.len(), 1);

    // one more is refused before reaching SQLite
    uuids.push("P2".into());
    let err = store.select_authorizations(&uuids).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Config);
}

#[tokio::test]
async fn test_failed_item_becomes_eligible_again() {
    let store = SqliteAuthorizationStore::in_memory().unwrap();
    let item = EsQueueItem::create("components/auth", "auth_P1", Some("P1".into()), "P1")
        .at(Utc::now() - Duration::hours(1));
    store.insert(&[item.clone()]).await.unwrap();

    let failed_at = Utc::now() - Duration::minutes(30);
    store
        .record_failure(&[item.uuid.clone()], failed_at)
        .await
        .unwrap();
    store
        .record_failure(&[item.uuid.clone()], failed_at)
        .await
        .unwrap();

    let eligible = store
        .select_for_recovery(Utc::now() - Duration::minutes(5), 10)
        .await
        .unwrap();
    assert_eq!(eligible.len(), 1);
    assert_eq!(eligible[0].attempts, 2);
    assert_eq!(eligible[0].created_at, item.created_at.trunc_subsecs(3));
}
