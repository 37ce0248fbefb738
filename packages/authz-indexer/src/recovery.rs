//! Recovery daemon
//!
//! Periodically drains the recovery queue: items not touched for
//! `min_age` are dispatched, grouped by `doc_type`, to the resilient indexer
//! serving that type. A pass stops when the queue is drained, when
//! `loop_limit` items were processed, or when a batch fails too much
//! (circuit breaker), leaving the rest for the next pass.

use authz_storage::{EsQueueItem, RecoveryQueue};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::bulk::IndexingResult;
use crate::config::RecoveryConfig;
use crate::error::Result;
use crate::indexer::{Indexer, ResilientIndexer};

pub struct RecoveryIndexer {
    queue: Arc<dyn RecoveryQueue>,
    /// Keyed by formatted index identity
    indexers: HashMap<String, Arc<dyn ResilientIndexer>>,
    config: RecoveryConfig,
}

impl RecoveryIndexer {
    pub fn new(
        queue: Arc<dyn RecoveryQueue>,
        indexers: Vec<Arc<dyn ResilientIndexer>>,
        config: RecoveryConfig,
    ) -> Self {
        let mut by_type = HashMap::new();
        for indexer in indexers {
            for index_type in indexer.index_types() {
                by_type.insert(index_type.format(), indexer.clone());
            }
        }
        Self {
            queue,
            indexers: by_type,
            config,
        }
    }

    /// One recovery pass
    pub async fn recover(&self) -> Result<IndexingResult> {
        let before = Utc::now() - self.config.min_age();
        let mut total = IndexingResult::default();
        let mut processed = 0usize;

        loop {
            let items = self
                .queue
                .select_for_recovery(before, self.config.batch_size)
                .await?;
            if items.is_empty() {
                break;
            }

            let batch = self.index_batch(items).await?;
            total.add(&batch);
            processed += batch.total();

            if batch.total() == 0 {
                break;
            }
            if batch.success_ratio() <= self.config.circuit_breaker_ratio {
                error!(
                    "Search recovery stopped, too many failures ({}/{} succeeded in last batch)",
                    batch.successes(),
                    batch.total()
                );
                break;
            }
            if processed >= self.config.loop_limit {
                info!("Search recovery reached its limit of {} items", self.config.loop_limit);
                break;
            }
        }

        if total.total() > 0 {
            info!(
                "Search recovery pass: {} items, {} succeeded, {} failed",
                total.total(),
                total.successes(),
                total.failures()
            );
        }
        Ok(total)
    }

    async fn index_batch(&self, items: Vec<EsQueueItem>) -> Result<IndexingResult> {
        let mut by_doc_type: BTreeMap<String, Vec<EsQueueItem>> = BTreeMap::new();
        for item in items {
            by_doc_type.entry(item.doc_type.clone()).or_default().push(item);
        }

        let mut result = IndexingResult::default();
        for (doc_type, group) in by_doc_type {
            let count = group.len();
            let uuids: Vec<String> = group.iter().map(|item| item.uuid.clone()).collect();

            let group_result = match self.indexers.get(&doc_type) {
                Some(indexer) => match indexer.index(group).await {
                    Ok(group_result) => group_result,
                    Err(e) => {
                        error!(
                            "Failed to recover {} items of type '{}' (retryable: {}): {}",
                            count,
                            doc_type,
                            e.is_retryable(),
                            e
                        );
                        self.queue.record_failure(&uuids, Utc::now()).await?;
                        IndexingResult::new(count, 0)
                    }
                },
                None => {
                    error!(
                        "Ignore search recovery of {} items with unsupported type '{}'",
                        count, doc_type
                    );
                    self.queue.record_failure(&uuids, Utc::now()).await?;
                    IndexingResult::new(count, 0)
                }
            };

            debug!(
                "Recovery of '{}': {}/{} succeeded",
                doc_type,
                group_result.successes(),
                group_result.total()
            );
            #[cfg(feature = "metrics")]
            crate::metrics::record_recovery(group_result.successes(), group_result.failures());
            result.add(&group_result);
        }
        Ok(result)
    }

    /// Run passes every `interval` after `initial_delay` until `shutdown` fires
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "Search recovery scheduled in {:?}, then every {:?}",
            self.config.initial_delay(),
            self.config.interval()
        );
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(self.config.initial_delay()) => {}
        }

        loop {
            if let Err(e) = self.recover().await {
                error!("Search recovery pass failed: {}", e);
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval()) => {}
            }
        }
        info!("Search recovery stopped");
    }
}
