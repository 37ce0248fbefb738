//! Prometheus metrics for authorization indexing

use prometheus::{IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

use crate::error::{IndexerError, Result};
use crate::index_type::IndexType;

pub struct IndexerMetrics {
    /// Documents written or deleted, by index and outcome
    pub docs: IntCounterVec,
    /// Recovery outcomes, by outcome
    pub recovery_items: IntCounterVec,
}

impl IndexerMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let docs = IntCounterVec::new(
            Opts::new("authz_index_docs_total", "Authorization documents sent to the search index"),
            &["index", "outcome"],
        )?;
        let recovery_items = IntCounterVec::new(
            Opts::new("authz_recovery_items_total", "Search recovery outcomes"),
            &["outcome"],
        )?;
        registry.register(Box::new(docs.clone()))?;
        registry.register(Box::new(recovery_items.clone()))?;
        Ok(Self {
            docs,
            recovery_items,
        })
    }
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();
static METRICS: OnceLock<Option<IndexerMetrics>> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

fn metrics() -> Option<&'static IndexerMetrics> {
    METRICS
        .get_or_init(|| IndexerMetrics::new(registry()).ok())
        .as_ref()
}

pub fn record_docs(index_type: &IndexType, successes: usize, failures: usize) {
    if let Some(m) = metrics() {
        let index = index_type.format();
        m.docs
            .with_label_values(&[index.as_str(), "success"])
            .inc_by(successes as u64);
        m.docs
            .with_label_values(&[index.as_str(), "failure"])
            .inc_by(failures as u64);
    }
}

pub fn record_recovery(successes: usize, failures: usize) {
    if let Some(m) = metrics() {
        m.recovery_items
            .with_label_values(&["success"])
            .inc_by(successes as u64);
        m.recovery_items
            .with_label_values(&["failure"])
            .inc_by(failures as u64);
    }
}

/// Text exposition format
pub fn render() -> Result<String> {
    // make sure the families exist before the first record
    let _ = metrics();
    TextEncoder::new()
        .encode_to_string(&registry().gather())
        .map_err(IndexerError::search)
}
