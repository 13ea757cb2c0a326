//! Workflow store errors.

use thiserror::Error;

/// Errors from a [`crate::store::WorkflowStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("workflow not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store backend error: {0}")]
    Backend(String),
}
