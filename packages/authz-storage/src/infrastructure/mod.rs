//! Infrastructure layer - Storage adapters

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteAuthorizationStore, MAX_AUTHORIZATION_QUERY_UUIDS};
