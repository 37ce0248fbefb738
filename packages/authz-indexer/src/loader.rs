//! Authorization snapshot loader
//!
//! Folds the tagged rows of the authorization query into one
//! [`IndexPermissions`] per entity. Private entities always contribute a
//! `Nobody` row, so an entity without any grant is still present in the
//! result (as "nobody") instead of silently missing.

use authz_storage::{AuthorizationReader, AuthorizationRow, EntityUuid, Qualifier, RowGrant};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;

/// Authorization facts of one entity at read time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPermissions {
    pub entity_uuid: EntityUuid,
    pub qualifier: Qualifier,
    pub user_uuids: BTreeSet<String>,
    pub group_uuids: BTreeSet<String>,
    /// When set, the grant sets are not authoritative
    pub allow_anyone: bool,
}

impl IndexPermissions {
    pub fn new(entity_uuid: impl Into<String>, qualifier: Qualifier) -> Self {
        Self {
            entity_uuid: entity_uuid.into(),
            qualifier,
            user_uuids: BTreeSet::new(),
            group_uuids: BTreeSet::new(),
            allow_anyone: false,
        }
    }

    pub fn add_user_uuid(&mut self, user_uuid: impl Into<String>) -> &mut Self {
        self.user_uuids.insert(user_uuid.into());
        self
    }

    pub fn add_group_uuid(&mut self, group_uuid: impl Into<String>) -> &mut Self {
        self.group_uuids.insert(group_uuid.into());
        self
    }

    pub fn allow_anyone(&mut self) -> &mut Self {
        self.allow_anyone = true;
        self
    }
}

/// Snapshots keyed by entity UUID
pub type Snapshots = BTreeMap<EntityUuid, IndexPermissions>;

/// Fold rows into `snapshots`. The first row of an entity fixes its qualifier.
pub fn fold_rows(snapshots: &mut Snapshots, rows: impl IntoIterator<Item = AuthorizationRow>) {
    for row in rows {
        let AuthorizationRow {
            entity_uuid,
            qualifier,
            grant,
        } = row;
        let snapshot = snapshots
            .entry(entity_uuid)
            .or_insert_with_key(|uuid| IndexPermissions::new(uuid.clone(), qualifier));
        match grant {
            RowGrant::User(user_uuid) => {
                snapshot.add_user_uuid(user_uuid);
            }
            RowGrant::Group(group_uuid) => {
                snapshot.add_group_uuid(group_uuid);
            }
            RowGrant::Anyone => {
                snapshot.allow_anyone();
            }
            // only guarantees presence
            RowGrant::Nobody => {}
        }
    }
}

pub struct PermissionLoader {
    reader: Arc<dyn AuthorizationReader>,
    partition_size: usize,
}

impl PermissionLoader {
    pub fn new(reader: Arc<dyn AuthorizationReader>, partition_size: usize) -> Self {
        Self {
            reader,
            partition_size,
        }
    }

    /// Number of UUIDs bound per query, capped by the reader's own limit
    pub fn batch_size(&self) -> usize {
        (self.partition_size / 2)
            .min(self.reader.max_entity_uuids())
            .max(1)
    }

    /// Load the snapshots of the given entities, or of all entities when
    /// `entity_uuids` is empty. Unknown UUIDs yield no entry. Any read failure
    /// fails the whole call.
    pub async fn load(&self, entity_uuids: &[String]) -> Result<Snapshots> {
        let mut snapshots = Snapshots::new();

        if entity_uuids.is_empty() {
            let rows = self.reader.select_authorizations(&[]).await?;
            fold_rows(&mut snapshots, rows);
            debug!("Loaded {} authorization snapshots (all entities)", snapshots.len());
            return Ok(snapshots);
        }

        let unique: Vec<String> = entity_uuids
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        for partition in unique.chunks(self.batch_size()) {
            let rows = self.reader.select_authorizations(partition).await?;
            fold_rows(&mut snapshots, rows);
        }

        debug!(
            "Loaded {} authorization snapshots for {} requested entities",
            snapshots.len(),
            unique.len()
        );
        Ok(snapshots)
    }

    pub async fn load_all(&self) -> Result<Snapshots> {
        self.load(&[]).await
    }
}
