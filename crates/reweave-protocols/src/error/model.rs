//! Language model errors.

use thiserror::Error;

/// Errors from a [`crate::model::LanguageModel`] implementation.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}
