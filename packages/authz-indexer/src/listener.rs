//! Recovery queue listener
//!
//! Bound to the queue items of one index identity within a recovery batch.
//! An item is confirmed by the document written for its `entity_uuid`, which
//! is the document the indexer derives from it whatever the item's `doc_id`
//! says. Confirmed documents delete their items (duplicates included).
//! Everything left when the session stops is recorded as a failed attempt.

use async_trait::async_trait;
use authz_storage::{EsQueueItem, RecoveryQueue};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::error;

use crate::bulk::{IndexingListener, IndexingResult};
use crate::document::id_of;
use crate::error::Result;

pub struct RecoveryListener {
    queue: Arc<dyn RecoveryQueue>,
    doc_type: String,
    items: Vec<EsQueueItem>,
    /// uuids of items already deleted from the queue
    confirmed: Mutex<HashSet<String>>,
}

impl RecoveryListener {
    pub fn new(queue: Arc<dyn RecoveryQueue>, doc_type: impl Into<String>, items: Vec<EsQueueItem>) -> Self {
        Self {
            queue,
            doc_type: doc_type.into(),
            items,
            confirmed: Mutex::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl IndexingListener for RecoveryListener {
    async fn on_success(&self, doc_ids: &[String]) -> Result<()> {
        let doc_ids: HashSet<&str> = doc_ids.iter().map(String::as_str).collect();
        let to_delete: Vec<String> = {
            let confirmed = self.confirmed.lock()?;
            self.items
                .iter()
                .filter(|item| {
                    doc_ids.contains(id_of(&item.entity_uuid).as_str())
                        && !confirmed.contains(&item.uuid)
                })
                .map(|item| item.uuid.clone())
                .collect()
        };
        if to_delete.is_empty() {
            return Ok(());
        }

        self.queue.delete(&to_delete).await?;
        self.confirmed.lock()?.extend(to_delete);
        Ok(())
    }

    async fn on_finish(&self, result: &IndexingResult) -> Result<()> {
        let remaining: Vec<String> = {
            let confirmed = self.confirmed.lock()?;
            self.items
                .iter()
                .filter(|item| !confirmed.contains(&item.uuid))
                .map(|item| item.uuid.clone())
                .collect()
        };

        if !result.is_success() {
            error!(
                "Failed to index {} documents of {}, {} recovery items will be retried",
                result.failures(),
                self.doc_type,
                remaining.len()
            );
        }
        if !remaining.is_empty() {
            self.queue.record_failure(&remaining, Utc::now()).await?;
        }
        Ok(())
    }
}
