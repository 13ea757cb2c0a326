//! In-memory workflow store for testing.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use reweave_protocols::{StepPatch, StoreError, Workflow, WorkflowStore, WorkflowSummary};

use crate::patch::apply_patches;

/// In-memory workflow store.
#[derive(Default)]
pub struct MemoryWorkflowStore {
    workflows: RwLock<HashMap<String, Workflow>>,
}

impl MemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a workflow document.
    pub async fn insert(&self, workflow: Workflow) {
        self.workflows
            .write()
            .await
            .insert(workflow.id.clone(), workflow);
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn load_workflow(&self, id: &str) -> Result<Workflow, StoreError> {
        self.workflows
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn save_step_patches(&self, id: &str, patches: &[StepPatch]) -> Result<(), StoreError> {
        if patches.is_empty() {
            return Ok(());
        }

        let mut workflows = self.workflows.write().await;
        let workflow = workflows
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        apply_patches(workflow, patches);
        Ok(())
    }

    async fn list_workflows(&self) -> Result<Vec<WorkflowSummary>, StoreError> {
        let workflows = self.workflows.read().await;
        let mut summaries: Vec<WorkflowSummary> =
            workflows.values().map(WorkflowSummary::from).collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }
}
