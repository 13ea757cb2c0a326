//! Step patch application.

use chrono::Utc;
use tracing::warn;

use reweave_protocols::{StepPatch, Workflow};

/// Apply healed-step patches to a workflow in place.
///
/// Each patch replaces the step at its recorded index wholesale. Application
/// is idempotent: replaying the same patch set leaves the workflow unchanged.
/// Patches whose index falls outside the current step list are skipped; a
/// concurrent writer may have changed the workflow since the run loaded it.
pub fn apply_patches(workflow: &mut Workflow, patches: &[StepPatch]) -> usize {
    let mut applied = 0;

    for patch in patches {
        let Some(slot) = workflow.steps.get_mut(patch.step_index) else {
            warn!(
                workflow = %workflow.id,
                step_index = patch.step_index,
                "Skipping patch outside current step range"
            );
            continue;
        };

        let mut step = patch.step.clone();
        step.index = patch.step_index;
        *slot = step;
        applied += 1;
    }

    if applied > 0 {
        workflow.metadata.step_count = workflow.steps.len();
        workflow.metadata.enhanced_at = Some(Utc::now());
    }

    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use reweave_protocols::{Action, Selector, Step, WorkflowMetadata};

    fn workflow_with_steps(n: usize) -> Workflow {
        Workflow {
            id: "wf-1".to_string(),
            name: "Test".to_string(),
            description: String::new(),
            requires_password: false,
            steps: (0..n).map(|i| Step::new(i, Action::Click)).collect(),
            metadata: WorkflowMetadata::default(),
        }
    }

    fn patch_for(index: usize) -> StepPatch {
        StepPatch {
            step_index: index,
            step: Step::new(index, Action::Click).with_selector(Selector::css("button.healed")),
            rationale: "selector drifted".to_string(),
        }
    }

    #[test]
    fn test_apply_replaces_step() {
        let mut workflow = workflow_with_steps(3);
        let applied = apply_patches(&mut workflow, &[patch_for(1)]);
        assert_eq!(applied, 1);
        assert_eq!(
            workflow.steps[1].selector,
            Some(Selector::css("button.healed"))
        );
        assert!(workflow.metadata.enhanced_at.is_some());
    }

    #[test]
    fn test_apply_is_idempotent() {
        let mut workflow = workflow_with_steps(3);
        let patches = vec![patch_for(0), patch_for(2)];
        apply_patches(&mut workflow, &patches);
        let snapshot = workflow.steps.clone();
        apply_patches(&mut workflow, &patches);
        assert_eq!(workflow.steps, snapshot);
    }

    #[test]
    fn test_apply_skips_out_of_range() {
        let mut workflow = workflow_with_steps(2);
        let applied = apply_patches(&mut workflow, &[patch_for(5)]);
        assert_eq!(applied, 0);
        assert!(workflow.metadata.enhanced_at.is_none());
    }

    #[test]
    fn test_apply_normalizes_patch_index() {
        let mut workflow = workflow_with_steps(3);
        let mut patch = patch_for(2);
        // A proposal may carry a stale embedded index; the patch position wins.
        patch.step.index = 7;
        apply_patches(&mut workflow, &[patch]);
        assert_eq!(workflow.steps[2].index, 2);
    }
}
