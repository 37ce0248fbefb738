use authz_storage::StorageError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Search backend error: {0}")]
    Search(String),

    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    #[error("Invalid index type: {0}")]
    InvalidIndexType(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IndexerError {
    pub fn search<E: std::fmt::Display>(e: E) -> Self {
        Self::Search(e.to_string())
    }

    pub fn config<E: std::fmt::Display>(e: E) -> Self {
        Self::Config(e.to_string())
    }

    /// Errors the recovery queue may simply retry later
    pub fn is_retryable(&self) -> bool {
        matches!(self, IndexerError::Storage(_) | IndexerError::Search(_) | IndexerError::Io(_))
    }
}

impl From<tantivy::TantivyError> for IndexerError {
    fn from(err: tantivy::TantivyError) -> Self {
        Self::search(err)
    }
}

impl From<tantivy::directory::error::OpenDirectoryError> for IndexerError {
    fn from(err: tantivy::directory::error::OpenDirectoryError) -> Self {
        Self::search(err)
    }
}

impl<T> From<std::sync::PoisonError<T>> for IndexerError {
    fn from(_err: std::sync::PoisonError<T>) -> Self {
        Self::Search("Index lock poisoned".to_string())
    }
}
