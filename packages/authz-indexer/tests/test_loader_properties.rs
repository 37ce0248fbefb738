//! Property tests for the snapshot loader
//!
//! Random entities with random grants are stored in SQLite, then loaded
//! with random partition sizes.

use authz_indexer::PermissionLoader;
use authz_storage::{Qualifier, SqliteAuthorizationStore, USER_PERMISSION};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct EntitySpec {
    private: bool,
    users: BTreeSet<u8>,
    groups: BTreeSet<u8>,
    /// grants inserted twice
    duplicate_grants: bool,
}

fn entity_spec() -> impl Strategy<Value = EntitySpec> {
    (
        any::<bool>(),
        prop::collection::btree_set(0u8..20, 0..5),
        prop::collection::btree_set(0u8..5, 0..3),
        any::<bool>(),
    )
        .prop_map(|(private, users, groups, duplicate_grants)| EntitySpec {
            private,
            users,
            groups,
            duplicate_grants,
        })
}

fn entity_uuid(i: usize) -> String {
    format!("E{:03}", i)
}

fn populate(specs: &[EntitySpec]) -> Arc<SqliteAuthorizationStore> {
    let store = Arc::new(SqliteAuthorizationStore::in_memory().unwrap());
    for g in 0u8..5 {
        store.insert_group(&format!("G{}", g), &format!("group-{}", g)).unwrap();
    }
    for (i, spec) in specs.iter().enumerate() {
        let uuid = entity_uuid(i);
        store
            .insert_project(&uuid, &uuid, Qualifier::Project, spec.private)
            .unwrap();
        let copies = if spec.duplicate_grants { 2 } else { 1 };
        for _ in 0..copies {
            for u in &spec.users {
                store.grant_user(&uuid, &format!("U{}", u), USER_PERMISSION).unwrap();
            }
            for g in &spec.groups {
                store
                    .grant_group(&uuid, Some(format!("G{}", g).as_str()), USER_PERMISSION)
                    .unwrap();
            }
        }
    }
    store
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_one_snapshot_per_entity_with_exact_grants(
        specs in prop::collection::vec(entity_spec(), 1..40),
        partition_size in 2usize..20,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let store = populate(&specs);
        let loader = PermissionLoader::new(store, partition_size);

        let mut requested: Vec<String> = (0..specs.len()).map(entity_uuid).collect();
        requested.push("missing".to_string());
        let snapshots = rt.block_on(loader.load(&requested)).unwrap();

        prop_assert_eq!(snapshots.len(), specs.len());
        for (i, spec) in specs.iter().enumerate() {
            let snapshot = &snapshots[&entity_uuid(i)];
            if spec.private {
                prop_assert!(!snapshot.allow_anyone);
                prop_assert_eq!(snapshot.user_uuids.len(), spec.users.len());
                prop_assert_eq!(snapshot.group_uuids.len(), spec.groups.len());
            } else {
                prop_assert!(snapshot.allow_anyone);
                prop_assert!(snapshot.user_uuids.is_empty());
                prop_assert!(snapshot.group_uuids.is_empty());
            }
        }
    }

    #[test]
    fn prop_partitioned_load_equals_load_all(
        specs in prop::collection::vec(entity_spec(), 1..40),
        partition_size in 2usize..20,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let store = populate(&specs);
        let loader = PermissionLoader::new(store, partition_size);

        let requested: Vec<String> = (0..specs.len()).rev().map(entity_uuid).collect();
        let partitioned = rt.block_on(loader.load(&requested)).unwrap();
        let all = rt.block_on(loader.load_all()).unwrap();

        prop_assert_eq!(partitioned, all);
    }
}
