//! Authorization storage
//!
//! Relational source of truth for "who may browse what":
//!
//! 1. **Entities**: projects (`TRK`), applications (`APP`) and top-level portfolios (`VW`),
//!    each either public or private
//! 2. **Grants**: the `user` permission given to users and groups on private entities
//! 3. **Recovery queue** (`es_queue`): durable outbox of documents to (re)index,
//!    written in the same unit of work as the change that made them stale
//!
//! ## Usage
//!
//! ```rust,ignore
//! use authz_storage::{AuthorizationReader, SqliteAuthorizationStore, Qualifier, USER_PERMISSION};
//!
//! let store = SqliteAuthorizationStore::new("authz.db")?;
//! store.insert_project("P1", "my-project", Qualifier::Project, true)?;
//! store.grant_user("P1", "U1", USER_PERMISSION)?;
//!
//! // One row per grant plus one visibility row per entity
//! let rows = store.select_authorizations(&["P1".to_string()]).await?;
//! ```

pub mod domain;
pub mod error;

#[cfg(feature = "sqlite")]
pub mod infrastructure;

pub use error::{ErrorKind, Result, StorageError};

pub use domain::{
    AuthorizationReader, AuthorizationRow, EntityUuid, EsQueueItem, Qualifier, RecoveryQueue,
    RowGrant, USER_PERMISSION,
};

#[cfg(feature = "sqlite")]
pub use infrastructure::{SqliteAuthorizationStore, MAX_AUTHORIZATION_QUERY_UUIDS};
