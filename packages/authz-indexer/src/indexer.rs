//! Indexer seams
//!
//! - `StartupIndexer`: fills indexes that do not exist yet
//! - `ResilientIndexer`: drains recovery queue items
//! - `EventIndexer`: turns domain mutations into recovery queue items

use async_trait::async_trait;
use authz_storage::EsQueueItem;
use std::collections::HashSet;

use crate::bulk::IndexingResult;
use crate::error::Result;
use crate::events::{BranchEvent, EntityEvent};
use crate::index_type::IndexType;

/// Index identities served by an indexer
pub trait Indexer: Send + Sync {
    fn index_types(&self) -> Vec<IndexType>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupType {
    /// Server startup waits for the indexation
    Synchronous,
    Asynchronous,
}

#[async_trait]
pub trait StartupIndexer: Indexer {
    fn startup_type(&self) -> StartupType {
        StartupType::Synchronous
    }

    async fn index_on_startup(&self, uninitialized: &HashSet<IndexType>) -> Result<IndexingResult>;
}

#[async_trait]
pub trait ResilientIndexer: Indexer {
    /// Index the effect of queue items. Items confirmed in the index are
    /// removed from the queue, the others stay eligible for redelivery.
    async fn index(&self, items: Vec<EsQueueItem>) -> Result<IndexingResult>;
}

#[async_trait]
pub trait EventIndexer: Indexer {
    /// Persist and return the recovery items needed by an entity event
    async fn prepare_for_recovery_on_entity_event(
        &self,
        event: EntityEvent,
        entity_uuids: &[String],
    ) -> Result<Vec<EsQueueItem>>;

    /// Persist and return the recovery items needed by a branch event
    async fn prepare_for_recovery_on_branch_event(
        &self,
        event: BranchEvent,
        branch_uuids: &[String],
    ) -> Result<Vec<EsQueueItem>>;
}
