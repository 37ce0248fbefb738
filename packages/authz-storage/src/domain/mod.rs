//! Domain layer for authz-storage
//!
//! # Domain Models
//!
//! - `Qualifier`: kind of an access-controlled entity (project, application, portfolio)
//! - `AuthorizationRow`: one row of the authorization query, tagged by row class
//! - `EsQueueItem`: outbox record driving recovery of search documents
//!
//! # Port Traits
//!
//! - `AuthorizationReader`: reads authorization rows, optionally restricted to entities
//! - `RecoveryQueue`: at-least-once outbox consumed by the indexers

pub mod models;
pub mod ports;

pub use models::{AuthorizationRow, EntityUuid, EsQueueItem, Qualifier, RowGrant, USER_PERMISSION};
pub use ports::{AuthorizationReader, RecoveryQueue};
