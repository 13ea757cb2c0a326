//! Run persistence adapter.

use tracing::{debug, error};

use reweave_protocols::{PersistenceFailure, StepPatch, WorkflowStore};

/// Writes healed-step patches back through the workflow store.
///
/// Failures here are reported, never fatal: a run that already finished keeps
/// its outcome, and the patches are simply lost for next time.
pub struct RunPersistence<'a> {
    store: &'a dyn WorkflowStore,
}

impl<'a> RunPersistence<'a> {
    pub fn new(store: &'a dyn WorkflowStore) -> Self {
        Self { store }
    }

    pub async fn persist(
        &self,
        workflow_id: &str,
        patches: &[StepPatch],
    ) -> Result<(), PersistenceFailure> {
        if patches.is_empty() {
            return Ok(());
        }

        match self.store.save_step_patches(workflow_id, patches).await {
            Ok(()) => {
                debug!(
                    workflow = workflow_id,
                    count = patches.len(),
                    "Healed patches persisted"
                );
                Ok(())
            }
            Err(e) => {
                error!(workflow = workflow_id, "Patch persistence failed: {}", e);
                Err(PersistenceFailure {
                    patch_count: patches.len(),
                    message: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reweave_protocols::store::MockWorkflowStore;
    use reweave_protocols::{Action, Selector, Step, StoreError};

    fn patch() -> StepPatch {
        StepPatch {
            step_index: 0,
            step: Step::new(0, Action::Click).with_selector(Selector::css("#new")),
            rationale: "selector drifted".to_string(),
        }
    }

    #[tokio::test]
    async fn test_empty_patch_set_skips_store() {
        let store = MockWorkflowStore::new();
        let persistence = RunPersistence::new(&store);
        persistence.persist("wf-1", &[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_persist_forwards_patches() {
        let mut store = MockWorkflowStore::new();
        store
            .expect_save_step_patches()
            .withf(|id, patches| id == "wf-1" && patches.len() == 1)
            .times(1)
            .returning(|_, _| Ok(()));
        let persistence = RunPersistence::new(&store);
        persistence.persist("wf-1", &[patch()]).await.unwrap();
    }

    #[tokio::test]
    async fn test_store_error_becomes_warning() {
        let mut store = MockWorkflowStore::new();
        store
            .expect_save_step_patches()
            .returning(|_, _| Err(StoreError::Backend("disk full".to_string())));
        let persistence = RunPersistence::new(&store);
        let failure = persistence.persist("wf-1", &[patch()]).await.unwrap_err();
        assert_eq!(failure.patch_count, 1);
        assert!(failure.message.contains("disk full"));
    }
}
