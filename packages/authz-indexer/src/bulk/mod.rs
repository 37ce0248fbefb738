//! Bulk write sessions
//!
//! # Architecture
//!
//! ```text
//! add / add_deletion → buffer → (flush size reached | stop) → SearchBackend::apply
//!                                                                 ↓
//!                                                     IndexingListener::on_success
//! ```
//!
//! A backend error fails every operation of the flush and is counted, never
//! raised. Callers look at the [`IndexingResult`] returned by `stop`.

pub mod schema;
pub mod tantivy_index;

pub use tantivy_index::TantivyAuthorizationIndex;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::config::BulkConfig;
use crate::document::AuthorizationDoc;
use crate::error::Result;
use crate::index_type::IndexType;

/// Expected volume of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Size {
    /// Recovery batches and event-driven indexing
    Regular,
    /// Full rebuilds
    Large,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkOp {
    Upsert(AuthorizationDoc),
    Delete { id: String, routing: Option<String> },
}

impl BulkOp {
    pub fn doc_id(&self) -> &str {
        match self {
            BulkOp::Upsert(doc) => &doc.id,
            BulkOp::Delete { id, .. } => id,
        }
    }
}

/// Outcome counters of one or several sessions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexingResult {
    total: usize,
    successes: usize,
}

impl IndexingResult {
    pub fn new(total: usize, successes: usize) -> Self {
        Self { total, successes }
    }

    pub fn incr_success(&mut self, count: usize) -> &mut Self {
        self.total += count;
        self.successes += count;
        self
    }

    pub fn incr_failure(&mut self, count: usize) -> &mut Self {
        self.total += count;
        self
    }

    pub fn add(&mut self, other: &IndexingResult) -> &mut Self {
        self.total += other.total;
        self.successes += other.successes;
        self
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn successes(&self) -> usize {
        self.successes
    }

    pub fn failures(&self) -> usize {
        self.total - self.successes
    }

    pub fn is_success(&self) -> bool {
        self.total == self.successes
    }

    /// 1.0 when nothing was attempted
    pub fn success_ratio(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.successes as f64 / self.total as f64
        }
    }
}

/// Document store behind the sessions
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Apply all operations atomically; an error fails all of them
    async fn apply(&self, index_type: &IndexType, ops: &[BulkOp]) -> Result<()>;

    async fn get(&self, index_type: &IndexType, id: &str) -> Result<Option<AuthorizationDoc>>;

    async fn count(&self, index_type: &IndexType) -> Result<usize>;
}

/// Delivery outcome callbacks of a session
#[async_trait]
pub trait IndexingListener: Send + Sync {
    /// Documents whose write or deletion is confirmed
    async fn on_success(&self, doc_ids: &[String]) -> Result<()>;

    /// Called once by `stop`, even when nothing was written
    async fn on_finish(&self, result: &IndexingResult) -> Result<()>;
}

pub struct BulkIndexer {
    backend: Arc<dyn SearchBackend>,
    index_type: IndexType,
    flush_size: usize,
    listener: Option<Arc<dyn IndexingListener>>,
    buffer: Vec<BulkOp>,
    result: IndexingResult,
}

impl BulkIndexer {
    pub fn start(
        backend: Arc<dyn SearchBackend>,
        index_type: IndexType,
        size: Size,
        config: &BulkConfig,
        listener: Option<Arc<dyn IndexingListener>>,
    ) -> Self {
        let flush_size = config.flush_size(size).max(1);
        debug!("Starting bulk session on {} (flush size {})", index_type, flush_size);
        Self {
            backend,
            index_type,
            flush_size,
            listener,
            buffer: Vec::with_capacity(flush_size),
            result: IndexingResult::default(),
        }
    }

    pub fn index_type(&self) -> &IndexType {
        &self.index_type
    }

    pub async fn add(&mut self, doc: AuthorizationDoc) {
        if doc.index_type != self.index_type {
            warn!(
                "Rejecting document {} of {} in session on {}",
                doc.id, doc.index_type, self.index_type
            );
            self.result.incr_failure(1);
            return;
        }
        self.push(BulkOp::Upsert(doc)).await;
    }

    pub async fn add_deletion(&mut self, id: impl Into<String>, routing: Option<String>) {
        self.push(BulkOp::Delete {
            id: id.into(),
            routing,
        })
        .await;
    }

    async fn push(&mut self, op: BulkOp) {
        self.buffer.push(op);
        if self.buffer.len() >= self.flush_size {
            self.flush().await;
        }
    }

    async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let ops = std::mem::take(&mut self.buffer);
        let count = ops.len();

        match self.backend.apply(&self.index_type, &ops).await {
            Ok(()) => {
                self.result.incr_success(count);
                #[cfg(feature = "metrics")]
                crate::metrics::record_docs(&self.index_type, count, 0);
                if let Some(listener) = &self.listener {
                    let doc_ids: Vec<String> = ops.iter().map(|op| op.doc_id().to_string()).collect();
                    if let Err(e) = listener.on_success(&doc_ids).await {
                        error!("Failed to acknowledge {} documents of {}: {}", count, self.index_type, e);
                    }
                }
            }
            Err(e) => {
                error!("Failed to write {} documents to {}: {}", count, self.index_type, e);
                self.result.incr_failure(count);
                #[cfg(feature = "metrics")]
                crate::metrics::record_docs(&self.index_type, 0, count);
            }
        }
    }

    /// Flush what is left and close the session
    pub async fn stop(mut self) -> IndexingResult {
        self.flush().await;
        if let Some(listener) = &self.listener {
            if let Err(e) = listener.on_finish(&self.result).await {
                error!("Failed to record outcome of session on {}: {}", self.index_type, e);
            }
        }
        debug!(
            "Bulk session on {} stopped: {}/{} succeeded",
            self.index_type, self.result.successes, self.result.total
        );
        self.result
    }
}
