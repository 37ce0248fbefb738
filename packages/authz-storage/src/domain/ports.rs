//! Storage Ports (Trait Interfaces)
//!
//! - Production: SQLite (`SqliteAuthorizationStore`)
//! - Testing: any hand-written implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::models::{AuthorizationRow, EsQueueItem};
use crate::Result;

/// Reads the authorization facts of entities
#[async_trait]
pub trait AuthorizationReader: Send + Sync {
    /// Select the authorization rows of the given entities.
    ///
    /// An empty slice means "all entities". Entities that do not exist
    /// produce no row. Callers keep the slice within `max_entity_uuids()`.
    async fn select_authorizations(&self, entity_uuids: &[String]) -> Result<Vec<AuthorizationRow>>;

    /// Largest number of entity UUIDs one `select_authorizations` call accepts
    fn max_entity_uuids(&self) -> usize {
        usize::MAX
    }
}

/// Outbox of documents to (re)index
#[async_trait]
pub trait RecoveryQueue: Send + Sync {
    /// Persist new items
    async fn insert(&self, items: &[EsQueueItem]) -> Result<()>;

    /// Oldest items not touched since `before`, ordered by `updated_at`
    async fn select_for_recovery(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<EsQueueItem>>;

    /// Remove items whose effect is confirmed in the index
    async fn delete(&self, item_uuids: &[String]) -> Result<()>;

    /// Increment `attempts` and move the cursor (`updated_at`) to `at`
    async fn record_failure(&self, item_uuids: &[String], at: DateTime<Utc>) -> Result<()>;

    /// Number of pending items
    async fn count(&self) -> Result<usize>;
}
