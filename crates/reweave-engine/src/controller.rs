//! Replay controller: the run state machine.
//!
//! `Idle -> Running -> {Succeeded, Failed, Cancelled}`, with a per-step
//! attempt/repair cycle bounded by the retry budget. Steps run strictly in
//! recorded order; a session error aborts regardless of remaining budget.

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{info, warn};

use reweave_protocols::{
    Action, DriverError, Extraction, LanguageModel, PageDriver, PageSnapshot, RepairProposal,
    RunError, RunReport, RunSecrets, RunState, RunStatus, StepPatch, Workflow, WorkflowStore,
};

use crate::config::ReplayConfig;
use crate::executor::StepExecutor;
use crate::interpret::InterpretError;
use crate::persist::RunPersistence;
use crate::repair::RepairAdvisor;

/// Drives one workflow run end to end.
pub struct ReplayController<'a> {
    driver: &'a dyn PageDriver,
    model: &'a dyn LanguageModel,
    store: &'a dyn WorkflowStore,
    config: ReplayConfig,
}

impl<'a> ReplayController<'a> {
    pub fn new(
        driver: &'a dyn PageDriver,
        model: &'a dyn LanguageModel,
        store: &'a dyn WorkflowStore,
        config: ReplayConfig,
    ) -> Self {
        Self {
            driver,
            model,
            store,
            config,
        }
    }

    /// Run the workflow to completion, updating `status` as it goes.
    ///
    /// Cancellation is honored between steps: the current step finishes its
    /// attempt cycle, accumulated patches are persisted, and the session is
    /// closed.
    pub async fn run(
        &self,
        workflow: &Workflow,
        secrets: &RunSecrets,
        status: &RwLock<RunStatus>,
        cancel: watch::Receiver<bool>,
    ) -> RunReport {
        let total_steps = workflow.steps.len();

        // Secret check comes before any browser interaction: a missing
        // password fails the run with zero steps attempted.
        let needs_password = workflow.requires_password || workflow.has_password_step();
        if needs_password && secrets.password().is_none() {
            let error = RunError::MissingRequiredSecret;
            warn!(workflow = %workflow.id, "{}", error);
            let report = RunReport {
                state: RunState::Failed,
                healed_step_count: 0,
                extractions: Vec::new(),
                error: Some(error.to_string()),
                persistence_warning: None,
            };
            let mut s = status.write();
            s.state = RunState::Failed;
            s.total_steps = total_steps;
            s.last_error = report.error.clone();
            return report;
        }

        {
            let mut s = status.write();
            s.state = RunState::Running;
            s.total_steps = total_steps;
        }
        info!(workflow = %workflow.id, steps = total_steps, "Run started");

        let executor = StepExecutor::new(self.driver, self.model, &self.config);
        let advisor = RepairAdvisor::new(self.model);

        let mut patches: Vec<StepPatch> = Vec::new();
        let mut extractions: Vec<Extraction> = Vec::new();
        let mut healed = 0usize;

        let outcome: Result<(), RunError> = 'run: {
            for original in &workflow.steps {
                if *cancel.borrow() {
                    info!(workflow = %workflow.id, step = original.index, "Run cancelled");
                    break 'run Err(RunError::Cancelled);
                }

                status.write().current_step = original.index;

                // The step under attempt; replaced by repair proposals. A
                // proposal becomes a patch only once its step succeeds.
                let mut current = original.clone();
                let mut pending_repair: Option<RepairProposal> = None;
                let mut attempts: u32 = 0;

                loop {
                    let value_override = matches!(current.action, Action::PasswordEntry)
                        .then(|| secrets.password())
                        .flatten();

                    match executor.execute(&current, value_override, attempts).await {
                        Ok(value) => {
                            if let Some(proposal) = pending_repair.take() {
                                info!(
                                    workflow = %workflow.id,
                                    step = original.index,
                                    attempts,
                                    "Step healed"
                                );
                                patches.push(proposal.into_patch());
                                healed += 1;
                                status.write().healed_step_count = healed;
                            }
                            if let (Some(data), Action::Extract { goal }) =
                                (value, &current.action)
                            {
                                extractions.push(Extraction {
                                    step_index: original.index,
                                    goal: goal.clone(),
                                    data,
                                });
                            }
                            break;
                        }
                        Err(InterpretError::Session(message)) => {
                            break 'run Err(RunError::Session {
                                step: original.index,
                                message,
                            });
                        }
                        Err(InterpretError::Step(failure)) => {
                            warn!(
                                workflow = %workflow.id,
                                step = original.index,
                                attempts,
                                "Step failed: {}",
                                failure
                            );
                            status.write().last_error =
                                Some(format!("step {}: {}", original.index, failure));

                            if attempts >= self.config.max_retries {
                                break 'run Err(RunError::RetryBudgetExhausted {
                                    step: original.index,
                                    kind: failure.kind,
                                    attempts,
                                    message: failure.message,
                                });
                            }

                            let snapshot = match self
                                .driver
                                .page_snapshot(self.config.snapshot_max_elements)
                                .await
                            {
                                Ok(snapshot) => snapshot,
                                Err(DriverError::Session(message)) => {
                                    break 'run Err(RunError::Session {
                                        step: original.index,
                                        message,
                                    });
                                }
                                Err(e) => {
                                    warn!("Snapshot unavailable for repair: {}", e);
                                    PageSnapshot::default()
                                }
                            };

                            match advisor.propose(&current, &failure, &snapshot).await {
                                Ok(proposal) => {
                                    // The advisor pins the replacement to the
                                    // failed step's index.
                                    current = proposal.step.clone();
                                    pending_repair = Some(proposal);
                                    attempts += 1;
                                }
                                Err(refusal) => {
                                    break 'run Err(RunError::RepairRefused {
                                        step: original.index,
                                        reason: refusal.reason,
                                    });
                                }
                            }
                        }
                    }
                }
            }
            Ok(())
        };

        // Partial-success policy: patches healed before a later failure (or a
        // cancellation) are still worth keeping.
        let persistence_warning = match RunPersistence::new(self.store)
            .persist(&workflow.id, &patches)
            .await
        {
            Ok(()) => None,
            Err(failure) => Some(failure.to_string()),
        };

        if let Err(e) = self.driver.close().await {
            warn!(workflow = %workflow.id, "Session close failed: {}", e);
        }

        let (state, error) = match &outcome {
            Ok(()) => (RunState::Succeeded, None),
            Err(RunError::Cancelled) => (RunState::Cancelled, None),
            Err(e) => (RunState::Failed, Some(e.to_string())),
        };

        info!(
            workflow = %workflow.id,
            state = ?state,
            healed,
            "Run finished"
        );

        {
            let mut s = status.write();
            s.state = state;
            s.healed_step_count = healed;
            s.last_error = error.clone();
            s.persistence_warning = persistence_warning.clone();
        }

        RunReport {
            state,
            healed_step_count: healed,
            extractions,
            error,
            persistence_warning,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;

    use reweave_protocols::driver::MockPageDriver;
    use reweave_protocols::model::MockLanguageModel;
    use reweave_protocols::store::MockWorkflowStore;
    use reweave_protocols::{Selector, Step, WorkflowMetadata};

    fn config() -> ReplayConfig {
        ReplayConfig {
            settle_delay: std::time::Duration::ZERO,
            ..Default::default()
        }
    }

    fn workflow(steps: Vec<Step>, requires_password: bool) -> Workflow {
        Workflow {
            id: "wf-test".to_string(),
            name: "Test".to_string(),
            description: String::new(),
            requires_password,
            steps,
            metadata: WorkflowMetadata::default(),
        }
    }

    fn click_step(index: usize, css: &str) -> Step {
        Step::new(index, Action::Click).with_selector(Selector::css(css))
    }

    fn status() -> RwLock<RunStatus> {
        RwLock::new(RunStatus::idle(0))
    }

    fn cancel_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    #[tokio::test]
    async fn test_missing_secret_fails_with_zero_driver_calls() {
        // No expectations set: any driver, model, or store call panics.
        let driver = MockPageDriver::new();
        let model = MockLanguageModel::new();
        let store = MockWorkflowStore::new();
        let controller = ReplayController::new(&driver, &model, &store, config());

        let wf = workflow(
            vec![Step::new(0, Action::PasswordEntry).with_selector(Selector::css("#pw"))],
            true,
        );
        let (_tx, rx) = cancel_channel();
        let st = status();
        let report = controller.run(&wf, &RunSecrets::new(), &st, rx).await;

        assert_eq!(report.state, RunState::Failed);
        assert!(report.error.unwrap().contains("password"));
        assert_eq!(st.read().state, RunState::Failed);
    }

    #[tokio::test]
    async fn test_no_password_steps_never_needs_secret() {
        let mut driver = MockPageDriver::new();
        driver.expect_wait_for().returning(|_, _| Ok(()));
        driver.expect_click().returning(|_| Ok(()));
        driver.expect_close().returning(|| Ok(()));
        let model = MockLanguageModel::new();
        let store = MockWorkflowStore::new();
        let controller = ReplayController::new(&driver, &model, &store, config());

        let wf = workflow(vec![click_step(0, "#a")], false);
        let (_tx, rx) = cancel_channel();
        let st = status();
        let report = controller.run(&wf, &RunSecrets::new(), &st, rx).await;

        assert_eq!(report.state, RunState::Succeeded);
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn test_steps_run_in_recorded_order() {
        let order: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let mut driver = MockPageDriver::new();
        driver.expect_wait_for().returning(|_, _| Ok(()));
        {
            let order = order.clone();
            driver.expect_click().returning(move |selector| {
                order.lock().unwrap().push(selector.describe());
                Ok(())
            });
        }
        driver.expect_close().returning(|| Ok(()));
        let model = MockLanguageModel::new();
        let store = MockWorkflowStore::new();
        let controller = ReplayController::new(&driver, &model, &store, config());

        let wf = workflow(
            vec![
                click_step(0, "#first"),
                click_step(1, "#second"),
                click_step(2, "#third"),
            ],
            false,
        );
        let (_tx, rx) = cancel_channel();
        let st = status();
        let report = controller.run(&wf, &RunSecrets::new(), &st, rx).await;

        assert_eq!(report.state, RunState::Succeeded);
        assert_eq!(
            *order.lock().unwrap(),
            vec!["#first", "#second", "#third"]
        );
    }

    #[tokio::test]
    async fn test_heal_scenario_repaired_step_succeeds() {
        // 3-step workflow; step 1 fails twice with ElementNotFound, the
        // repaired selector works on the third attempt.
        let mut driver = MockPageDriver::new();
        driver.expect_wait_for().returning(|selector, _| {
            if selector.describe() == "#broken" {
                Err(DriverError::Timeout("never appeared".to_string()))
            } else {
                Ok(())
            }
        });
        let broken_attempts = Arc::new(Mutex::new(0u32));
        {
            let broken_attempts = broken_attempts.clone();
            driver.expect_click().returning(move |selector| {
                if selector.describe() == "#flaky" {
                    let mut n = broken_attempts.lock().unwrap();
                    *n += 1;
                    if *n < 2 {
                        return Err(DriverError::ElementNotFound("#flaky".to_string()));
                    }
                }
                Ok(())
            });
        }
        driver
            .expect_page_snapshot()
            .returning(|_| Ok(PageSnapshot::default()));
        driver.expect_close().returning(|| Ok(()));

        let mut model = MockLanguageModel::new();
        model.expect_complete().returning(|_| {
            Ok(r##"{"type": "click", "selector": {"css": "#flaky"}, "rationale": "selector moved"}"##
                .to_string())
        });

        let mut store = MockWorkflowStore::new();
        store
            .expect_save_step_patches()
            .withf(|id, patches| {
                id == "wf-test"
                    && patches.len() == 1
                    && patches[0].step_index == 1
                    && patches[0].step.selector == Some(Selector::css("#flaky"))
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let controller = ReplayController::new(&driver, &model, &store, config());
        let wf = workflow(
            vec![
                click_step(0, "#ok-1"),
                click_step(1, "#broken"),
                click_step(2, "#ok-2"),
            ],
            false,
        );
        let (_tx, rx) = cancel_channel();
        let st = status();
        let report = controller.run(&wf, &RunSecrets::new(), &st, rx).await;

        assert_eq!(report.state, RunState::Succeeded);
        assert_eq!(report.healed_step_count, 1);
        assert_eq!(st.read().healed_step_count, 1);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted_after_five_repairs() {
        let mut driver = MockPageDriver::new();
        driver
            .expect_wait_for()
            .returning(|_, _| Err(DriverError::Timeout("gone".to_string())));
        driver
            .expect_page_snapshot()
            .returning(|_| Ok(PageSnapshot::default()));
        driver.expect_close().returning(|| Ok(()));

        let mut model = MockLanguageModel::new();
        // Budget is 5: exactly 5 proposals, then exhaustion with no 6th call.
        model.expect_complete().times(5).returning(|_| {
            Ok(r##"{"type": "click", "selector": {"css": "#still-gone"}, "rationale": "retry"}"##
                .to_string())
        });

        let store = MockWorkflowStore::new();
        let controller = ReplayController::new(&driver, &model, &store, config());

        let wf = workflow(vec![click_step(0, "#gone")], false);
        let (_tx, rx) = cancel_channel();
        let st = status();
        let report = controller.run(&wf, &RunSecrets::new(), &st, rx).await;

        assert_eq!(report.state, RunState::Failed);
        let error = report.error.unwrap();
        assert!(error.contains("5 repair attempt"));
        assert!(error.contains("element_not_found"));
    }

    #[tokio::test]
    async fn test_earlier_heals_persist_after_later_failure() {
        // Step 0 heals; step 1 exhausts its budget. The step-0 patch must
        // still reach the store.
        let mut driver = MockPageDriver::new();
        driver.expect_wait_for().returning(|selector, _| {
            match selector.describe().as_str() {
                "#healed" | "#ok" => Ok(()),
                _ => Err(DriverError::Timeout("gone".to_string())),
            }
        });
        driver.expect_click().returning(|_| Ok(()));
        driver
            .expect_page_snapshot()
            .returning(|_| Ok(PageSnapshot::default()));
        driver.expect_close().returning(|| Ok(()));

        let mut model = MockLanguageModel::new();
        let proposals = Arc::new(Mutex::new(0u32));
        {
            let proposals = proposals.clone();
            model.expect_complete().returning(move |_| {
                let mut n = proposals.lock().unwrap();
                *n += 1;
                let css = if *n == 1 { "#healed" } else { "#nope" };
                Ok(format!(
                    r#"{{"type": "click", "selector": {{"css": "{css}"}}, "rationale": "r"}}"#
                ))
            });
        }

        let mut store = MockWorkflowStore::new();
        store
            .expect_save_step_patches()
            .withf(|_, patches| patches.len() == 1 && patches[0].step_index == 0)
            .times(1)
            .returning(|_, _| Ok(()));

        let controller = ReplayController::new(&driver, &model, &store, config());
        let wf = workflow(
            vec![click_step(0, "#missing"), click_step(1, "#also-missing")],
            false,
        );
        let (_tx, rx) = cancel_channel();
        let st = status();
        let report = controller.run(&wf, &RunSecrets::new(), &st, rx).await;

        assert_eq!(report.state, RunState::Failed);
        assert_eq!(report.healed_step_count, 1);
    }

    #[tokio::test]
    async fn test_repair_refusal_fails_run() {
        let mut driver = MockPageDriver::new();
        driver
            .expect_wait_for()
            .returning(|_, _| Err(DriverError::Timeout("gone".to_string())));
        driver
            .expect_page_snapshot()
            .returning(|_| Ok(PageSnapshot::default()));
        driver.expect_close().returning(|| Ok(()));

        let mut model = MockLanguageModel::new();
        model
            .expect_complete()
            .times(1)
            .returning(|_| Ok("not json".to_string()));

        let store = MockWorkflowStore::new();
        let controller = ReplayController::new(&driver, &model, &store, config());

        let wf = workflow(vec![click_step(0, "#x")], false);
        let (_tx, rx) = cancel_channel();
        let st = status();
        let report = controller.run(&wf, &RunSecrets::new(), &st, rx).await;

        assert_eq!(report.state, RunState::Failed);
        assert!(report.error.unwrap().contains("repair refused"));
    }

    #[tokio::test]
    async fn test_session_error_aborts_immediately() {
        let mut driver = MockPageDriver::new();
        driver
            .expect_wait_for()
            .returning(|_, _| Err(DriverError::Session("browser crashed".to_string())));
        driver.expect_close().returning(|| Ok(()));
        let model = MockLanguageModel::new();
        let store = MockWorkflowStore::new();
        let controller = ReplayController::new(&driver, &model, &store, config());

        let wf = workflow(vec![click_step(0, "#x"), click_step(1, "#y")], false);
        let (_tx, rx) = cancel_channel();
        let st = status();
        let report = controller.run(&wf, &RunSecrets::new(), &st, rx).await;

        assert_eq!(report.state, RunState::Failed);
        assert!(report.error.unwrap().contains("browser session error"));
    }

    #[tokio::test]
    async fn test_cancellation_between_steps() {
        let mut driver = MockPageDriver::new();
        driver.expect_close().times(1).returning(|| Ok(()));
        let model = MockLanguageModel::new();
        let store = MockWorkflowStore::new();
        let controller = ReplayController::new(&driver, &model, &store, config());

        let wf = workflow(vec![click_step(0, "#x")], false);
        let (tx, rx) = cancel_channel();
        tx.send(true).unwrap();
        let st = status();
        let report = controller.run(&wf, &RunSecrets::new(), &st, rx).await;

        assert_eq!(report.state, RunState::Cancelled);
        assert_eq!(st.read().state, RunState::Cancelled);
    }

    #[tokio::test]
    async fn test_cancellation_persists_earlier_heals() {
        // Step 0 heals, then cancellation fires before step 1. The healed
        // patch must still reach the store.
        let (tx, rx) = cancel_channel();
        let tx = Arc::new(tx);

        let mut driver = MockPageDriver::new();
        driver.expect_wait_for().returning(|selector, _| {
            if selector.describe() == "#healed" {
                Ok(())
            } else {
                Err(DriverError::Timeout("gone".to_string()))
            }
        });
        {
            let tx = tx.clone();
            driver.expect_click().returning(move |_| {
                let _ = tx.send(true);
                Ok(())
            });
        }
        driver
            .expect_page_snapshot()
            .returning(|_| Ok(PageSnapshot::default()));
        driver.expect_close().times(1).returning(|| Ok(()));

        let mut model = MockLanguageModel::new();
        model.expect_complete().returning(|_| {
            Ok(r##"{"type": "click", "selector": {"css": "#healed"}, "rationale": "r"}"##
                .to_string())
        });

        let mut store = MockWorkflowStore::new();
        store
            .expect_save_step_patches()
            .withf(|id, patches| {
                id == "wf-test" && patches.len() == 1 && patches[0].step_index == 0
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let controller = ReplayController::new(&driver, &model, &store, config());
        let wf = workflow(
            vec![click_step(0, "#stale"), click_step(1, "#never-reached")],
            false,
        );
        let st = status();
        let report = controller.run(&wf, &RunSecrets::new(), &st, rx).await;

        assert_eq!(report.state, RunState::Cancelled);
        assert_eq!(report.healed_step_count, 1);
        assert!(report.persistence_warning.is_none());
    }

    #[tokio::test]
    async fn test_persistence_failure_is_warning_not_state_change() {
        let mut driver = MockPageDriver::new();
        driver.expect_wait_for().returning(|selector, _| {
            if selector.describe() == "#new" {
                Ok(())
            } else {
                Err(DriverError::Timeout("gone".to_string()))
            }
        });
        driver.expect_click().returning(|_| Ok(()));
        driver
            .expect_page_snapshot()
            .returning(|_| Ok(PageSnapshot::default()));
        driver.expect_close().returning(|| Ok(()));

        let mut model = MockLanguageModel::new();
        model.expect_complete().returning(|_| {
            Ok(r##"{"type": "click", "selector": {"css": "#new"}, "rationale": "r"}"##.to_string())
        });

        let mut store = MockWorkflowStore::new();
        store.expect_save_step_patches().returning(|_, _| {
            Err(reweave_protocols::StoreError::Backend(
                "disk full".to_string(),
            ))
        });

        let controller = ReplayController::new(&driver, &model, &store, config());
        let wf = workflow(vec![click_step(0, "#old")], false);
        let (_tx, rx) = cancel_channel();
        let st = status();
        let report = controller.run(&wf, &RunSecrets::new(), &st, rx).await;

        assert_eq!(report.state, RunState::Succeeded);
        assert!(report.persistence_warning.unwrap().contains("disk full"));
    }

    #[tokio::test]
    async fn test_extraction_output_collected() {
        let mut driver = MockPageDriver::new();
        driver
            .expect_visible_text()
            .returning(|_| Ok("Total: $99".to_string()));
        driver.expect_close().returning(|| Ok(()));
        let mut model = MockLanguageModel::new();
        model
            .expect_complete()
            .returning(|_| Ok(r#"{"total": 99}"#.to_string()));
        let store = MockWorkflowStore::new();
        let controller = ReplayController::new(&driver, &model, &store, config());

        let wf = workflow(
            vec![Step::new(
                0,
                Action::Extract {
                    goal: "order total".to_string(),
                },
            )],
            false,
        );
        let (_tx, rx) = cancel_channel();
        let st = status();
        let report = controller.run(&wf, &RunSecrets::new(), &st, rx).await;

        assert_eq!(report.state, RunState::Succeeded);
        assert_eq!(report.extractions.len(), 1);
        assert_eq!(report.extractions[0].data["total"], 99);
    }
}
