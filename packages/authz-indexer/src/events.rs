//! Domain mutation events relevant to search indexes

use serde::{Deserialize, Serialize};

/// Mutation of a project, application or portfolio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityEvent {
    Creation,
    Deletion,
    ProjectKeyUpdate,
    ProjectTagsUpdate,
    PermissionChange,
}

/// Mutation of a branch of a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BranchEvent {
    Deletion,
    MeasureChange,
    SwitchOfMainBranch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_string(&EntityEvent::PermissionChange).unwrap(),
            "\"PERMISSION_CHANGE\""
        );
        let event: BranchEvent = serde_json::from_str("\"SWITCH_OF_MAIN_BRANCH\"").unwrap();
        assert_eq!(event, BranchEvent::SwitchOfMainBranch);
    }
}
