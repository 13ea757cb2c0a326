//! Run state and status reporting.

use serde::{Deserialize, Serialize};

/// Top-level run state machine: `Idle -> Running -> {Succeeded, Failed}`,
/// with `Cancelled` reachable from `Running` between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Succeeded | RunState::Failed | RunState::Cancelled
        )
    }
}

/// Polled status of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatus {
    pub state: RunState,
    /// Zero-based index of the step currently (or last) being attempted.
    pub current_step: usize,
    pub total_steps: usize,
    pub healed_step_count: usize,
    /// Human-readable summary of the last failure, if any. Never a raw
    /// internal error dump.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Set when patch persistence failed after the run itself finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence_warning: Option<String>,
}

impl RunStatus {
    pub fn idle(total_steps: usize) -> Self {
        Self {
            state: RunState::Idle,
            current_step: 0,
            total_steps,
            healed_step_count: 0,
            last_error: None,
            persistence_warning: None,
        }
    }
}

/// Output of one `extract` step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub step_index: usize,
    pub goal: String,
    pub data: serde_json::Value,
}

/// Terminal result of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub state: RunState,
    pub healed_step_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extractions: Vec<Extraction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence_warning: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!RunState::Idle.is_terminal());
        assert!(!RunState::Running.is_terminal());
        assert!(RunState::Succeeded.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(RunState::Cancelled.is_terminal());
    }

    #[test]
    fn test_status_serde_skips_empty_error() {
        let status = RunStatus::idle(3);
        let json = serde_json::to_value(&status).unwrap();
        assert!(json.get("last_error").is_none());
        assert_eq!(json["total_steps"], 3);
    }
}
