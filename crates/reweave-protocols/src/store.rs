//! Workflow store seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::workflow::{StepPatch, Workflow};

/// List-view projection of a stored workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requires_password: bool,
    pub step_count: usize,
}

impl From<&Workflow> for WorkflowSummary {
    fn from(w: &Workflow) -> Self {
        Self {
            id: w.id.clone(),
            name: w.name.clone(),
            description: w.description.clone(),
            requires_password: w.requires_password,
            step_count: w.steps.len(),
        }
    }
}

/// Document persistence for workflows.
///
/// `save_step_patches` must be idempotent: applying the same patch set twice
/// leaves the stored workflow in the same state. Implementations never
/// receive run-time secrets; `PasswordEntry` steps carry no value by
/// construction.
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn load_workflow(&self, id: &str) -> Result<Workflow, StoreError>;

    async fn save_step_patches(&self, id: &str, patches: &[StepPatch]) -> Result<(), StoreError>;

    async fn list_workflows(&self) -> Result<Vec<WorkflowSummary>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{Action, Step, WorkflowMetadata};

    #[test]
    fn test_summary_from_workflow() {
        let workflow = Workflow {
            id: "wf-1".to_string(),
            name: "Search".to_string(),
            description: "Searches things".to_string(),
            requires_password: false,
            steps: vec![
                Step::new(
                    0,
                    Action::Navigate {
                        url: "https://example.com".to_string(),
                    },
                ),
                Step::new(1, Action::Click),
            ],
            metadata: WorkflowMetadata::default(),
        };

        let summary = WorkflowSummary::from(&workflow);
        assert_eq!(summary.id, "wf-1");
        assert_eq!(summary.step_count, 2);
        assert!(!summary.requires_password);
    }
}
