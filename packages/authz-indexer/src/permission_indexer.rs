//! Permission indexer
//!
//! Projects the authorization snapshots of entities into every registered
//! authorization scope.
//!
//! # Paths
//!
//! ```text
//! full rebuild:  load all ──► per scope: Large session, accepted snapshots only
//!
//! recovery:      items ──► group by doc_type ──► load referenced entities
//!                            │                        │
//!                            ▼                        ▼
//!                   one session per scope   accepted → upsert, rejected → delete
//!                   + RecoveryListener      missing entity → delete everywhere
//! ```
//!
//! Recovery items carry no payload, the state is always recomputed from the
//! relational store. Processing an item twice gives the same documents.

use async_trait::async_trait;
use authz_storage::{AuthorizationReader, EsQueueItem, RecoveryQueue};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bulk::{BulkIndexer, IndexingResult, SearchBackend, Size};
use crate::config::{BulkConfig, IndexerConfig};
use crate::document::{id_of, AuthorizationDoc};
use crate::error::Result;
use crate::events::{BranchEvent, EntityEvent};
use crate::index_type::IndexType;
use crate::indexer::{EventIndexer, Indexer, ResilientIndexer, StartupIndexer};
use crate::listener::RecoveryListener;
use crate::loader::PermissionLoader;
use crate::scope::{AuthorizationScope, ScopeRegistry};

pub struct PermissionIndexer {
    loader: PermissionLoader,
    queue: Arc<dyn RecoveryQueue>,
    backend: Arc<dyn SearchBackend>,
    registry: Arc<ScopeRegistry>,
    bulk: BulkConfig,
}

impl PermissionIndexer {
    pub fn new(
        reader: Arc<dyn AuthorizationReader>,
        queue: Arc<dyn RecoveryQueue>,
        backend: Arc<dyn SearchBackend>,
        registry: Arc<ScopeRegistry>,
        config: &IndexerConfig,
    ) -> Self {
        Self {
            loader: PermissionLoader::new(reader, config.partition_size),
            queue,
            backend,
            registry,
            bulk: config.bulk.clone(),
        }
    }

    pub fn registry(&self) -> &ScopeRegistry {
        &self.registry
    }

    /// Rebuild the selected authorization indexes from every entity
    pub async fn index_all(&self, selected: &HashSet<IndexType>) -> Result<IndexingResult> {
        let scopes: Vec<&AuthorizationScope> = self
            .registry
            .scopes()
            .iter()
            .filter(|scope| selected.contains(scope.index_type()))
            .collect();
        if scopes.is_empty() {
            return Ok(IndexingResult::default());
        }

        let snapshots = self.loader.load_all().await?;
        if snapshots.is_empty() {
            debug!("No entity to index");
            return Ok(IndexingResult::default());
        }

        let mut result = IndexingResult::default();
        for scope in scopes {
            let mut session = BulkIndexer::start(
                self.backend.clone(),
                scope.index_type().clone(),
                Size::Large,
                &self.bulk,
                None,
            );
            for snapshot in snapshots.values().filter(|s| scope.accepts(s)) {
                session
                    .add(AuthorizationDoc::from_permissions(scope.index_type(), snapshot))
                    .await;
            }
            let scope_result = session.stop().await;
            info!(
                "Indexed {} authorizations into {} ({} failures)",
                scope_result.successes(),
                scope.index_type(),
                scope_result.failures()
            );
            result.add(&scope_result);
        }
        Ok(result)
    }

    /// Enqueue the recovery items of an entity event, then index them right away.
    /// Items left in the queue are picked up by the recovery daemon.
    pub async fn commit_and_index_on_entity_event(
        &self,
        event: EntityEvent,
        entity_uuids: &[String],
    ) -> Result<IndexingResult> {
        let items = self
            .prepare_for_recovery_on_entity_event(event, entity_uuids)
            .await?;
        self.index(items).await
    }

    /// One item per scope and entity
    fn recovery_items(&self, entity_uuids: &[String]) -> Vec<EsQueueItem> {
        let entity_uuids: BTreeSet<&String> = entity_uuids.iter().collect();
        self.registry
            .scopes()
            .iter()
            .flat_map(|scope| {
                let doc_type = scope.index_type().format();
                entity_uuids.iter().map(move |uuid| {
                    EsQueueItem::create(doc_type.clone(), id_of(uuid), Some((*uuid).clone()), *uuid)
                })
            })
            .collect()
    }
}

impl Indexer for PermissionIndexer {
    fn index_types(&self) -> Vec<IndexType> {
        self.registry.index_types()
    }
}

#[async_trait]
impl StartupIndexer for PermissionIndexer {
    async fn index_on_startup(&self, uninitialized: &HashSet<IndexType>) -> Result<IndexingResult> {
        self.index_all(uninitialized).await
    }
}

#[async_trait]
impl ResilientIndexer for PermissionIndexer {
    async fn index(&self, items: Vec<EsQueueItem>) -> Result<IndexingResult> {
        if items.is_empty() {
            return Ok(IndexingResult::default());
        }

        let mut by_doc_type: BTreeMap<String, Vec<EsQueueItem>> = BTreeMap::new();
        for item in items {
            by_doc_type.entry(item.doc_type.clone()).or_default().push(item);
        }

        let mut supported: Vec<(&AuthorizationScope, Vec<EsQueueItem>)> = Vec::new();
        for (doc_type, group) in by_doc_type {
            match self.registry.find_by_doc_type(&doc_type) {
                Some(scope) => supported.push((scope, group)),
                None => warn!(
                    "Skipping {} recovery items of unsupported type '{}'",
                    group.len(),
                    doc_type
                ),
            }
        }
        if supported.is_empty() {
            return Ok(IndexingResult::default());
        }

        let mut remaining: BTreeSet<String> = supported
            .iter()
            .flat_map(|(_, group)| group.iter().map(|item| item.entity_uuid.clone()))
            .collect();
        let entity_uuids: Vec<String> = remaining.iter().cloned().collect();

        // read before opening sessions: a failed read leaves the queue untouched
        let snapshots = self.loader.load(&entity_uuids).await?;

        let mut sessions: Vec<(&AuthorizationScope, BulkIndexer)> = supported
            .into_iter()
            .map(|(scope, group)| {
                let listener = Arc::new(RecoveryListener::new(
                    self.queue.clone(),
                    scope.index_type().format(),
                    group,
                ));
                let session = BulkIndexer::start(
                    self.backend.clone(),
                    scope.index_type().clone(),
                    Size::Regular,
                    &self.bulk,
                    Some(listener),
                );
                (scope, session)
            })
            .collect();

        for snapshot in snapshots.values() {
            remaining.remove(&snapshot.entity_uuid);
            for (scope, session) in sessions.iter_mut() {
                if scope.accepts(snapshot) {
                    session
                        .add(AuthorizationDoc::from_permissions(scope.index_type(), snapshot))
                        .await;
                } else {
                    session
                        .add_deletion(id_of(&snapshot.entity_uuid), Some(snapshot.entity_uuid.clone()))
                        .await;
                }
            }
        }

        // entities gone from the relational store
        for entity_uuid in &remaining {
            for (_, session) in sessions.iter_mut() {
                session
                    .add_deletion(id_of(entity_uuid), Some(entity_uuid.clone()))
                    .await;
            }
        }

        let mut result = IndexingResult::default();
        for (_, session) in sessions {
            result.add(&session.stop().await);
        }
        debug!(
            "Recovered {} entities ({} deleted): {}/{} operations succeeded",
            entity_uuids.len(),
            remaining.len(),
            result.successes(),
            result.total()
        );
        Ok(result)
    }
}

#[async_trait]
impl EventIndexer for PermissionIndexer {
    async fn prepare_for_recovery_on_entity_event(
        &self,
        event: EntityEvent,
        entity_uuids: &[String],
    ) -> Result<Vec<EsQueueItem>> {
        let items = match event {
            EntityEvent::Creation | EntityEvent::Deletion | EntityEvent::PermissionChange => {
                self.recovery_items(entity_uuids)
            }
            // key and tags are not part of authorization documents
            EntityEvent::ProjectKeyUpdate | EntityEvent::ProjectTagsUpdate => Vec::new(),
        };
        if !items.is_empty() {
            self.queue.insert(&items).await?;
        }
        Ok(items)
    }

    async fn prepare_for_recovery_on_branch_event(
        &self,
        event: BranchEvent,
        _branch_uuids: &[String],
    ) -> Result<Vec<EsQueueItem>> {
        // authorization is computed per entity, never per branch
        match event {
            BranchEvent::Deletion | BranchEvent::MeasureChange | BranchEvent::SwitchOfMainBranch => {
                Ok(Vec::new())
            }
        }
    }
}
