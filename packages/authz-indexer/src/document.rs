//! Authorization document model

use serde::{Deserialize, Serialize};

use crate::index_type::IndexType;
use crate::loader::IndexPermissions;

pub const ID_PREFIX: &str = "auth_";

/// Document id of the authorization of an entity
pub fn id_of(entity_uuid: &str) -> String {
    format!("{}{}", ID_PREFIX, entity_uuid)
}

/// Inverse of [`id_of`]; ids without the prefix are returned unchanged
pub fn entity_uuid_of(id: &str) -> &str {
    id.strip_prefix(ID_PREFIX).unwrap_or(id)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationDoc {
    pub index_type: IndexType,
    pub id: String,
    /// Entity UUID
    pub routing: String,
    pub allow_anyone: bool,
    pub group_ids: Vec<String>,
    pub user_ids: Vec<String>,
}

impl AuthorizationDoc {
    /// Grant lists are dropped for public entities
    pub fn from_permissions(index_type: &IndexType, permissions: &IndexPermissions) -> Self {
        let (group_ids, user_ids) = if permissions.allow_anyone {
            (Vec::new(), Vec::new())
        } else {
            (
                permissions.group_uuids.iter().cloned().collect(),
                permissions.user_uuids.iter().cloned().collect(),
            )
        };
        Self {
            index_type: index_type.clone(),
            id: id_of(&permissions.entity_uuid),
            routing: permissions.entity_uuid.clone(),
            allow_anyone: permissions.allow_anyone,
            group_ids,
            user_ids,
        }
    }

    pub fn entity_uuid(&self) -> &str {
        entity_uuid_of(&self.id)
    }
}
