//! Authorization scopes
//!
//! A scope pairs an authorization index identity with the predicate
//! selecting the entities that index holds a document for. The registry is
//! built once at startup and shared read-only.

use authz_storage::Qualifier;
use std::fmt;
use std::sync::Arc;

use crate::error::{IndexerError, Result};
use crate::index_type::{IndexType, COMPONENTS_INDEX, ISSUES_INDEX, PROJECT_MEASURES_INDEX};
use crate::loader::IndexPermissions;

pub type ScopePredicate = Arc<dyn Fn(&IndexPermissions) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct AuthorizationScope {
    index_type: IndexType,
    predicate: ScopePredicate,
}

impl AuthorizationScope {
    /// Fails when `index_type` is not an authorization relation
    pub fn new<F>(index_type: IndexType, predicate: F) -> Result<Self>
    where
        F: Fn(&IndexPermissions) -> bool + Send + Sync + 'static,
    {
        if !index_type.is_authorization() {
            return Err(IndexerError::InvalidScope(format!(
                "{} is not an authorization index",
                index_type
            )));
        }
        Ok(Self {
            index_type,
            predicate: Arc::new(predicate),
        })
    }

    /// Scope holding a document for every entity
    pub fn all(index_type: IndexType) -> Result<Self> {
        Self::new(index_type, |_| true)
    }

    /// Scope restricted to the given qualifiers
    pub fn of_qualifiers(index_type: IndexType, qualifiers: &[Qualifier]) -> Result<Self> {
        let qualifiers = qualifiers.to_vec();
        Self::new(index_type, move |p| qualifiers.contains(&p.qualifier))
    }

    pub fn index_type(&self) -> &IndexType {
        &self.index_type
    }

    pub fn accepts(&self, permissions: &IndexPermissions) -> bool {
        (self.predicate)(permissions)
    }
}

impl fmt::Debug for AuthorizationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationScope")
            .field("index_type", &self.index_type)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct ScopeRegistry {
    scopes: Vec<AuthorizationScope>,
}

impl ScopeRegistry {
    /// Fails on two scopes for the same index identity
    pub fn new(scopes: Vec<AuthorizationScope>) -> Result<Self> {
        for (i, scope) in scopes.iter().enumerate() {
            if scopes[..i].iter().any(|s| s.index_type == scope.index_type) {
                return Err(IndexerError::InvalidScope(format!(
                    "{} is registered twice",
                    scope.index_type
                )));
            }
        }
        Ok(Self { scopes })
    }

    /// Issues of projects, measures of projects and applications, components of every entity
    pub fn default_scopes() -> Result<Self> {
        Self::new(vec![
            AuthorizationScope::of_qualifiers(
                IndexType::authorization(ISSUES_INDEX),
                &[Qualifier::Project],
            )?,
            AuthorizationScope::of_qualifiers(
                IndexType::authorization(PROJECT_MEASURES_INDEX),
                &[Qualifier::Project, Qualifier::Application],
            )?,
            AuthorizationScope::all(IndexType::authorization(COMPONENTS_INDEX))?,
        ])
    }

    pub fn scopes(&self) -> &[AuthorizationScope] {
        &self.scopes
    }

    pub fn find(&self, index_type: &IndexType) -> Option<&AuthorizationScope> {
        self.scopes.iter().find(|s| &s.index_type == index_type)
    }

    /// Lookup by the formatted identity stored in `es_queue.doc_type`
    pub fn find_by_doc_type(&self, doc_type: &str) -> Option<&AuthorizationScope> {
        IndexType::parse(doc_type)
            .ok()
            .and_then(|index_type| self.find(&index_type))
    }

    pub fn index_types(&self) -> Vec<IndexType> {
        self.scopes.iter().map(|s| s.index_type.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}
