//! Step-level failure classification.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure category for a single step attempt. This is what the repair
/// advisor sees; categories here are recoverable through the repair cycle
/// while the run budget allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ElementNotFound,
    Timeout,
    AssertionMismatch,
    UnsupportedAction,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ElementNotFound => "element_not_found",
            FailureKind::Timeout => "timeout",
            FailureKind::AssertionMismatch => "assertion_mismatch",
            FailureKind::UnsupportedAction => "unsupported_action",
        }
    }
}

/// A classified step failure with its diagnostic payload.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}: {message}", kind.as_str())]
pub struct StepFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl StepFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn element_not_found(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ElementNotFound, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    pub fn assertion_mismatch(message: impl Into<String>) -> Self {
        Self::new(FailureKind::AssertionMismatch, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(FailureKind::UnsupportedAction, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_failure_display() {
        let failure = StepFailure::element_not_found("#submit gone");
        assert_eq!(failure.to_string(), "element_not_found: #submit gone");
    }
}
