//! Domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{Result, StorageError};

/// Entity UUID (project, application or top-level portfolio)
pub type EntityUuid = String;

/// The only permission that grants browsing an entity
pub const USER_PERMISSION: &str = "user";

/// Entity kind discriminator, stored as a short code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Qualifier {
    /// `TRK`
    Project,
    /// `APP`, aggregation of projects
    Application,
    /// `VW`, top-level portfolio
    Portfolio,
}

impl Qualifier {
    pub fn code(&self) -> &'static str {
        match self {
            Qualifier::Project => "TRK",
            Qualifier::Application => "APP",
            Qualifier::Portfolio => "VW",
        }
    }
}

impl FromStr for Qualifier {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "TRK" => Ok(Qualifier::Project),
            "APP" => Ok(Qualifier::Application),
            "VW" => Ok(Qualifier::Portfolio),
            _ => Err(StorageError::serialization(format!(
                "Unknown qualifier: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Row class of the authorization query
///
/// Private entities produce `User`/`Group` rows for each explicit grant plus
/// exactly one `Nobody` row. Public entities produce exactly one `Anyone` row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RowGrant {
    User(String),
    Group(String),
    Anyone,
    Nobody,
}

impl RowGrant {
    /// Rebuild from the `kind`, `user_uuid` and `group_uuid` columns
    pub fn from_columns(
        kind: &str,
        user_uuid: Option<String>,
        group_uuid: Option<String>,
    ) -> Result<Self> {
        match (kind, user_uuid, group_uuid) {
            ("user", Some(user), _) => Ok(RowGrant::User(user)),
            ("group", _, Some(group)) => Ok(RowGrant::Group(group)),
            ("anyone", _, _) => Ok(RowGrant::Anyone),
            ("nobody", _, _) => Ok(RowGrant::Nobody),
            (other, _, _) => Err(StorageError::serialization(format!(
                "Malformed authorization row of kind '{}'",
                other
            ))),
        }
    }
}

/// One row of the four-branch authorization query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRow {
    pub entity_uuid: EntityUuid,
    pub qualifier: Qualifier,
    pub grant: RowGrant,
}

impl AuthorizationRow {
    pub fn new(entity_uuid: impl Into<String>, qualifier: Qualifier, grant: RowGrant) -> Self {
        Self {
            entity_uuid: entity_uuid.into(),
            qualifier,
            grant,
        }
    }
}

/// Recovery queue item (row of `es_queue`)
///
/// `updated_at` is the recovery cursor: an item is eligible for recovery once
/// it has not been touched for the configured minimum age.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EsQueueItem {
    pub uuid: String,
    /// Formatted index identity, e.g. `issues/auth`
    pub doc_type: String,
    pub doc_id: String,
    pub doc_routing: Option<String>,
    pub entity_uuid: EntityUuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub attempts: u32,
}

impl EsQueueItem {
    pub fn create(
        doc_type: impl Into<String>,
        doc_id: impl Into<String>,
        doc_routing: Option<String>,
        entity_uuid: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            uuid: Uuid::new_v4().to_string(),
            doc_type: doc_type.into(),
            doc_id: doc_id.into(),
            doc_routing,
            entity_uuid: entity_uuid.into(),
            created_at: now,
            updated_at: now,
            attempts: 0,
        }
    }

    /// Override both timestamps (useful for replaying old items)
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.created_at = timestamp;
        self.updated_at = timestamp;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualifier_codes() {
        for qualifier in [Qualifier::Project, Qualifier::Application, Qualifier::Portfolio] {
            assert_eq!(qualifier.code().parse::<Qualifier>().unwrap(), qualifier);
        }
        assert!("FIL".parse::<Qualifier>().is_err());
    }

    #[test]
    fn test_row_grant_from_columns() {
        assert_eq!(
            RowGrant::from_columns("user", Some("U1".into()), None).unwrap(),
            RowGrant::User("U1".into())
        );
        assert_eq!(
            RowGrant::from_columns("group", None, Some("G1".into())).unwrap(),
            RowGrant::Group("G1".into())
        );
        assert_eq!(
            RowGrant::from_columns("nobody", None, None).unwrap(),
            RowGrant::Nobody
        );
        // a user row without user column is corrupt
        assert!(RowGrant::from_columns("user", None, None).is_err());
        assert!(RowGrant::from_columns("admin", None, None).is_err());
    }

    #[test]
    fn test_queue_item_create() {
        let item = EsQueueItem::create("issues/auth", "auth_P1", Some("P1".into()), "P1");
        assert_eq!(item.doc_type, "issues/auth");
        assert_eq!(item.attempts, 0);
        assert_eq!(item.created_at, item.updated_at);
        assert!(Uuid::parse_str(&item.uuid).is_ok());
    }
}
