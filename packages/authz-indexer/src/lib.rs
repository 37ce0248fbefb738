//! Authorization indexing
//!
//! Keeps denormalized authorization documents ("who may browse this entity")
//! in search indexes consistent with the relational store.
//!
//! ## Flow
//!
//! ```text
//! mutation ──► EventIndexer::prepare_for_recovery_on_entity_event ──► es_queue
//!                                                                        │
//!              RecoveryIndexer::recover ◄────────────────────────────────┘
//!                      │
//!                      ▼
//!              PermissionIndexer::index ──► PermissionLoader ──► AuthorizationDoc
//!                      │
//!                      ▼
//!              BulkIndexer ──► SearchBackend (tantivy)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use authz_indexer::{IndexerConfig, PermissionIndexer, ScopeRegistry, TantivyAuthorizationIndex};
//! use authz_storage::SqliteAuthorizationStore;
//!
//! let config = IndexerConfig::default();
//! let store = Arc::new(SqliteAuthorizationStore::new("authz.db")?);
//! let registry = Arc::new(ScopeRegistry::default_scopes()?);
//! let indexer = PermissionIndexer::new(
//!     store.clone(),
//!     store,
//!     Arc::new(TantivyAuthorizationIndex::in_ram()?),
//!     registry.clone(),
//!     &config,
//! );
//!
//! // Full rebuild of every authorization index
//! indexer.index_all(&registry.index_types().into_iter().collect()).await?;
//! ```

pub mod bulk;
pub mod config;
pub mod document;
pub mod error;
pub mod events;
pub mod index_type;
pub mod indexer;
pub mod listener;
pub mod loader;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod permission_indexer;
pub mod recovery;
pub mod scope;

pub use bulk::{
    BulkIndexer, BulkOp, IndexingListener, IndexingResult, SearchBackend, Size,
    TantivyAuthorizationIndex,
};
pub use config::{BulkConfig, IndexerConfig, RecoveryConfig};
pub use document::{entity_uuid_of, id_of, AuthorizationDoc};
pub use error::{IndexerError, Result};
pub use events::{BranchEvent, EntityEvent};
pub use index_type::IndexType;
pub use indexer::{EventIndexer, Indexer, ResilientIndexer, StartupIndexer, StartupType};
pub use listener::RecoveryListener;
pub use loader::{IndexPermissions, PermissionLoader, Snapshots};
pub use permission_indexer::PermissionIndexer;
pub use recovery::RecoveryIndexer;
pub use scope::{AuthorizationScope, ScopeRegistry};
