//! Step executor: bounded, verified execution of one step attempt.

use serde_json::Value;
use tracing::{debug, warn};

use reweave_protocols::{Action, LanguageModel, PageDriver, Step, StepFailure};

use crate::config::ReplayConfig;
use crate::interpret::{InterpretError, Interpreter};

/// Wraps the interpreter with the per-attempt policy: settle delay before
/// acting, a hard step timeout, and post-step verification where checkable.
pub struct StepExecutor<'a> {
    driver: &'a dyn PageDriver,
    interpreter: Interpreter<'a>,
    config: &'a ReplayConfig,
}

impl<'a> StepExecutor<'a> {
    pub fn new(
        driver: &'a dyn PageDriver,
        model: &'a dyn LanguageModel,
        config: &'a ReplayConfig,
    ) -> Self {
        Self {
            driver,
            interpreter: Interpreter::new(driver, model, config),
            config,
        }
    }

    /// Execute one attempt of a step.
    pub async fn execute(
        &self,
        step: &Step,
        value_override: Option<&str>,
        attempt: u32,
    ) -> Result<Option<Value>, InterpretError> {
        debug!(step = step.index, attempt, "Executing step");

        tokio::time::sleep(self.config.settle_delay).await;

        let result = tokio::time::timeout(
            self.config.step_timeout,
            self.interpreter.interpret(step, value_override),
        )
        .await
        .map_err(|_| {
            InterpretError::Step(StepFailure::timeout(format!(
                "step exceeded {}s",
                self.config.step_timeout.as_secs()
            )))
        })??;

        self.verify(step).await?;
        Ok(result)
    }

    /// Post-step verification: for value-bearing actions the target must
    /// still be present afterwards, unless the action navigated away.
    async fn verify(&self, step: &Step) -> Result<(), InterpretError> {
        let checkable = matches!(step.action, Action::Type { .. } | Action::Select { .. });
        if !checkable {
            return Ok(());
        }
        let Some(selector) = step.selector.as_ref().filter(|s| !s.is_empty()) else {
            return Ok(());
        };

        match self.driver.is_visible(selector).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(StepFailure::assertion_mismatch(format!(
                "element vanished after action: {}",
                selector.describe()
            ))
            .into()),
            // Verification is best-effort; a flaky check must not fail a
            // step that already ran.
            Err(e) => {
                warn!(step = step.index, "Post-step verification skipped: {}", e);
                Ok(())
            }
        }
    }
}
