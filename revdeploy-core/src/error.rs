//! Errors raised by the revision store

use crate::backend::BackendError;

/// Result type for revision store operations
pub type Result<T> = std::result::Result<T, RevisionStoreError>;

/// Errors that can occur while uploading or activating revisions
#[derive(Debug, thiserror::Error)]
pub enum RevisionStoreError {
    /// The artifact key already holds a value and overwriting is disabled
    #[error("Value already exists for key: {key}")]
    AlreadyExists { key: String },

    /// The revision is not in the recent-uploads window
    #[error("`{0}` is not a valid revision key")]
    InvalidRevision(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}
