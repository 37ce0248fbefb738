//! Search index identities
//!
//! An identity is either a main type (`issues/issue`) or a relation type
//! attached to a main type (`issues/auth`). Authorization documents always
//! live in the relation named [`AUTHORIZATION_RELATION`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{IndexerError, Result};

/// Name of the relation holding authorization documents
pub const AUTHORIZATION_RELATION: &str = "auth";

pub const ISSUES_INDEX: &str = "issues";
pub const PROJECT_MEASURES_INDEX: &str = "projectmeasures";
pub const COMPONENTS_INDEX: &str = "components";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IndexType {
    Main { index: String, name: String },
    Relation { index: String, name: String },
}

impl IndexType {
    pub fn main(index: impl Into<String>, name: impl Into<String>) -> Self {
        IndexType::Main {
            index: index.into(),
            name: name.into(),
        }
    }

    pub fn relation(index: impl Into<String>, name: impl Into<String>) -> Self {
        IndexType::Relation {
            index: index.into(),
            name: name.into(),
        }
    }

    /// The authorization relation of `index`
    pub fn authorization(index: impl Into<String>) -> Self {
        Self::relation(index, AUTHORIZATION_RELATION)
    }

    pub fn index(&self) -> &str {
        match self {
            IndexType::Main { index, .. } | IndexType::Relation { index, .. } => index,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            IndexType::Main { name, .. } | IndexType::Relation { name, .. } => name,
        }
    }

    pub fn is_authorization(&self) -> bool {
        matches!(self, IndexType::Relation { name, .. } if name == AUTHORIZATION_RELATION)
    }

    /// `index/name`, the form stored in `es_queue.doc_type`
    pub fn format(&self) -> String {
        format!("{}/{}", self.index(), self.name())
    }

    /// Inverse of [`IndexType::format`]. The authorization relation is the
    /// only relation known here, any other name parses as a main type.
    pub fn parse(s: &str) -> Result<Self> {
        let (index, name) = s
            .split_once('/')
            .ok_or_else(|| IndexerError::InvalidIndexType(s.to_string()))?;
        if index.is_empty() || name.is_empty() || name.contains('/') {
            return Err(IndexerError::InvalidIndexType(s.to_string()));
        }
        if name == AUTHORIZATION_RELATION {
            Ok(Self::authorization(index))
        } else {
            Ok(Self::main(index, name))
        }
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index(), self.name())
    }
}

impl FromStr for IndexType {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for IndexType {
    type Error = IndexerError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<IndexType> for String {
    fn from(index_type: IndexType) -> Self {
        index_type.format()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_and_parse() {
        let auth = IndexType::authorization(ISSUES_INDEX);
        assert_eq!(auth.format(), "issues/auth");
        assert_eq!(IndexType::parse("issues/auth").unwrap(), auth);

        let main = IndexType::main(ISSUES_INDEX, "issue");
        assert_eq!(IndexType::parse(&main.format()).unwrap(), main);
    }

    #[test]
    fn test_is_authorization() {
        assert!(IndexType::authorization(COMPONENTS_INDEX).is_authorization());
        assert!(!IndexType::main(COMPONENTS_INDEX, "auth").is_authorization());
        assert!(!IndexType::relation(COMPONENTS_INDEX, "child").is_authorization());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "issues", "/auth", "issues/", "a/b/c"] {
            assert!(
                matches!(IndexType::parse(bad), Err(IndexerError::InvalidIndexType(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&IndexType::authorization(PROJECT_MEASURES_INDEX)).unwrap();
        assert_eq!(json, "\"projectmeasures/auth\"");
        let back: IndexType = serde_json::from_str(&json).unwrap();
        assert!(back.is_authorization());
    }
}
