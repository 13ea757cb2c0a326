//! Run lifecycle management.
//!
//! Each run gets its own browser session from a [`DriverFactory`] and runs as
//! a spawned task; callers poll status by run id and may cancel between
//! steps.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use reweave_protocols::{
    DriverError, LanguageModel, PageDriver, RunError, RunReport, RunSecrets, RunState, RunStatus,
    WorkflowStore,
};

use crate::config::ReplayConfig;
use crate::controller::ReplayController;

/// Creates a fresh browser session per run.
///
/// Runs never share a session; the driver returned here is owned by the run
/// task and closed by the controller when the run ends.
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn create(&self) -> Result<Box<dyn PageDriver>, DriverError>;
}

struct RunEntry {
    status: Arc<RwLock<RunStatus>>,
    cancel: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<RunReport>>>,
}

/// Registry of in-flight and finished runs.
pub struct RunManager {
    store: Arc<dyn WorkflowStore>,
    model: Arc<dyn LanguageModel>,
    drivers: Arc<dyn DriverFactory>,
    config: ReplayConfig,
    runs: Mutex<HashMap<String, Arc<RunEntry>>>,
}

impl RunManager {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        model: Arc<dyn LanguageModel>,
        drivers: Arc<dyn DriverFactory>,
        config: ReplayConfig,
    ) -> Self {
        Self {
            store,
            model,
            drivers,
            config,
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Start a run of the given workflow and return its run id.
    ///
    /// The workflow is loaded before anything is spawned, so an unknown id
    /// fails here rather than inside the task. The secret check also happens
    /// before a browser launches: a missing password never costs a session.
    pub async fn start_run(
        &self,
        workflow_id: &str,
        secrets: RunSecrets,
    ) -> Result<String, RunError> {
        let workflow = self.store.load_workflow(workflow_id).await?;

        let run_id = Uuid::new_v4().to_string();
        let status = Arc::new(RwLock::new(RunStatus::idle(workflow.steps.len())));
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let store = self.store.clone();
        let model = self.model.clone();
        let drivers = self.drivers.clone();
        let config = self.config.clone();
        let task_status = status.clone();

        let task = tokio::spawn(async move {
            let needs_password = workflow.requires_password || workflow.has_password_step();
            if needs_password && secrets.password().is_none() {
                let error = RunError::MissingRequiredSecret;
                warn!(workflow = %workflow.id, "{}", error);
                let mut s = task_status.write();
                s.state = RunState::Failed;
                s.last_error = Some(error.to_string());
                return RunReport {
                    state: RunState::Failed,
                    healed_step_count: 0,
                    extractions: Vec::new(),
                    error: Some(error.to_string()),
                    persistence_warning: None,
                };
            }

            let driver = match drivers.create().await {
                Ok(driver) => driver,
                Err(e) => {
                    error!(workflow = %workflow.id, "Browser launch failed: {}", e);
                    let message = format!("browser launch failed: {e}");
                    let mut s = task_status.write();
                    s.state = RunState::Failed;
                    s.last_error = Some(message.clone());
                    return RunReport {
                        state: RunState::Failed,
                        healed_step_count: 0,
                        extractions: Vec::new(),
                        error: Some(message),
                        persistence_warning: None,
                    };
                }
            };

            let controller =
                ReplayController::new(driver.as_ref(), model.as_ref(), store.as_ref(), config);
            controller
                .run(&workflow, &secrets, &task_status, cancel_rx)
                .await
        });

        let entry = Arc::new(RunEntry {
            status,
            cancel: cancel_tx,
            task: Mutex::new(Some(task)),
        });
        self.runs.lock().insert(run_id.clone(), entry);
        info!(run = %run_id, workflow = workflow_id, "Run registered");

        Ok(run_id)
    }

    /// Current status of a run, or `None` for an unknown id.
    pub fn run_status(&self, run_id: &str) -> Option<RunStatus> {
        let runs = self.runs.lock();
        runs.get(run_id).map(|entry| entry.status.read().clone())
    }

    /// Request cancellation. Returns false for an unknown id. The run honors
    /// the request between steps; poll [`run_status`](Self::run_status) for
    /// the terminal state.
    pub fn cancel_run(&self, run_id: &str) -> bool {
        let runs = self.runs.lock();
        match runs.get(run_id) {
            Some(entry) => entry.cancel.send(true).is_ok(),
            None => false,
        }
    }

    /// Drop a finished run from the registry so the map does not grow
    /// without bound. Returns false when the id is unknown or the run has
    /// not reached a terminal state yet.
    pub fn remove_run(&self, run_id: &str) -> bool {
        let mut runs = self.runs.lock();
        let terminal = match runs.get(run_id) {
            Some(entry) => entry.status.read().state.is_terminal(),
            None => false,
        };
        if terminal {
            runs.remove(run_id);
        }
        terminal
    }

    /// Wait for a run to finish and return its report.
    ///
    /// Consumes the run's task handle; a second wait on the same id returns
    /// `None`, as does an unknown id.
    pub async fn wait_run(&self, run_id: &str) -> Option<RunReport> {
        let task = {
            let runs = self.runs.lock();
            runs.get(run_id)?.task.lock().take()?
        };

        match task.await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(run = run_id, "Run task panicked: {}", e);
                Some(RunReport {
                    state: RunState::Failed,
                    healed_step_count: 0,
                    extractions: Vec::new(),
                    error: Some(format!("run task failed: {e}")),
                    persistence_warning: None,
                })
            }
        }
    }
}
