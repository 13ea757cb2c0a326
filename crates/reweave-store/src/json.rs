//! JSON file workflow store.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};

use reweave_protocols::{StepPatch, StoreError, Workflow, WorkflowStore, WorkflowSummary};

use crate::patch::apply_patches;

/// Workflow store backed by a directory of JSON documents.
///
/// One file per workflow: `{dir}/{id}.json`. Writes go through a temp file in
/// the same directory followed by a rename, so readers never see a partially
/// written document. Patch persistence is last-writer-wins across concurrent
/// runs of the same workflow.
pub struct JsonWorkflowStore {
    dir: PathBuf,
}

impl JsonWorkflowStore {
    /// Open (and create if needed) a store at the given directory.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        debug!("JsonWorkflowStore initialized at {:?}", dir);
        Ok(Self { dir })
    }

    fn workflow_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    async fn read_workflow(&self, id: &str) -> Result<Workflow, StoreError> {
        let path = self.workflow_path(id);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    async fn write_workflow(&self, workflow: &Workflow) -> Result<(), StoreError> {
        let path = self.workflow_path(&workflow.id);
        let content = serde_json::to_string_pretty(workflow)?;

        // Write-then-rename keeps the document intact under crashes.
        let tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| StoreError::Backend(format!("temp file: {}", e)))?;
        let (file, tmp_path) = tmp.into_parts();
        drop(file);
        fs::write(&tmp_path, content).await?;
        fs::rename(&tmp_path, &path).await?;
        let _ = tmp_path.keep();

        debug!("Saved workflow '{}' to {:?}", workflow.id, path);
        Ok(())
    }

    /// Store a full workflow document.
    pub async fn save_workflow(&self, workflow: &Workflow) -> Result<(), StoreError> {
        self.write_workflow(workflow).await
    }
}

#[async_trait]
impl WorkflowStore for JsonWorkflowStore {
    async fn load_workflow(&self, id: &str) -> Result<Workflow, StoreError> {
        self.read_workflow(id).await
    }

    async fn save_step_patches(&self, id: &str, patches: &[StepPatch]) -> Result<(), StoreError> {
        if patches.is_empty() {
            return Ok(());
        }

        // Reload rather than patching the in-run copy: another run may have
        // healed other steps since this run started.
        let mut workflow = self.read_workflow(id).await?;
        let applied = apply_patches(&mut workflow, patches);
        self.write_workflow(&workflow).await?;

        debug!(
            workflow = id,
            applied,
            total = patches.len(),
            "Persisted step patches"
        );
        Ok(())
    }

    async fn list_workflows(&self) -> Result<Vec<WorkflowSummary>, StoreError> {
        let mut summaries = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            match fs::read_to_string(&path).await {
                Ok(content) => match serde_json::from_str::<Workflow>(&content) {
                    Ok(workflow) => summaries.push(WorkflowSummary::from(&workflow)),
                    Err(e) => warn!("Failed to deserialize workflow from {:?}: {}", path, e),
                },
                Err(e) => warn!("Failed to read workflow file {:?}: {}", path, e),
            }
        }

        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }
}
