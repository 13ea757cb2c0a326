//! Run-level terminal errors.

use thiserror::Error;

use super::{FailureKind, StoreError};

/// Terminal reasons a run ends in `Failed`.
#[derive(Debug, Error)]
pub enum RunError {
    /// The workflow requires a password and none was supplied. Checked
    /// before any browser action; the run fails fast with zero steps
    /// attempted.
    #[error("workflow requires a password but no run-time secret was supplied")]
    MissingRequiredSecret,

    /// A step burned through its whole repair budget.
    #[error(
        "step {step} failed ({kind}) after {attempts} repair attempt(s): {message}",
        kind = .kind.as_str()
    )]
    RetryBudgetExhausted {
        step: usize,
        kind: FailureKind,
        attempts: u32,
        message: String,
    },

    /// The repair model could not produce a structurally valid replacement.
    #[error("repair refused for step {step}: {reason}")]
    RepairRefused { step: usize, reason: String },

    /// The browser session itself became unusable. Aborts regardless of
    /// remaining budget.
    #[error("browser session error at step {step}: {message}")]
    Session { step: usize, message: String },

    #[error("run cancelled")]
    Cancelled,

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Persisting healed patches failed after the run already finished. Reported
/// as a warning alongside the run result; it does not retroactively fail a
/// succeeded run.
#[derive(Debug, Error)]
#[error("failed to persist {patch_count} healed step patch(es): {message}")]
pub struct PersistenceFailure {
    pub patch_count: usize,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_exhausted_display() {
        let err = RunError::RetryBudgetExhausted {
            step: 2,
            kind: FailureKind::ElementNotFound,
            attempts: 5,
            message: "#buy-button".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("step 2"));
        assert!(text.contains("element_not_found"));
        assert!(text.contains("5 repair attempt"));
    }

    #[test]
    fn test_missing_secret_display() {
        let err = RunError::MissingRequiredSecret;
        assert!(err.to_string().contains("password"));
    }
}
