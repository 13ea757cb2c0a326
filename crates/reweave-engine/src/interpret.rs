//! Action interpreter: one recorded action against the live page.

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use reweave_protocols::{
    Action, CompletionRequest, DriverError, LanguageModel, PageDriver, Selector, Step, StepFailure,
};

use crate::config::ReplayConfig;

/// Outcome classification for one interpretation attempt.
///
/// `Step` failures are candidates for the repair cycle; `Session` failures
/// mean the browser itself is gone and the run must abort.
#[derive(Debug, Error)]
pub enum InterpretError {
    #[error(transparent)]
    Step(#[from] StepFailure),

    #[error("session error: {0}")]
    Session(String),
}

impl From<DriverError> for InterpretError {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::ElementNotFound(m) => StepFailure::element_not_found(m).into(),
            DriverError::Timeout(m) => StepFailure::timeout(m).into(),
            DriverError::Action(m) => {
                StepFailure::assertion_mismatch(format!("action failed: {}", m)).into()
            }
            DriverError::Session(m) => InterpretError::Session(m),
        }
    }
}

/// Interprets single steps against a page driver, with the language model on
/// hand for `extract` actions.
pub struct Interpreter<'a> {
    driver: &'a dyn PageDriver,
    model: &'a dyn LanguageModel,
    config: &'a ReplayConfig,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        driver: &'a dyn PageDriver,
        model: &'a dyn LanguageModel,
        config: &'a ReplayConfig,
    ) -> Self {
        Self {
            driver,
            model,
            config,
        }
    }

    /// Perform the step's action once. `value_override` substitutes the typed
    /// value for password steps; it is never logged. Extraction steps return
    /// the extracted JSON.
    pub async fn interpret(
        &self,
        step: &Step,
        value_override: Option<&str>,
    ) -> Result<Option<Value>, InterpretError> {
        debug!(step = step.index, action = step.action.kind(), "Interpreting step");

        match &step.action {
            Action::Navigate { url } => {
                self.driver.goto(url).await?;
                Ok(None)
            }
            Action::Click => {
                let selector = self.require_selector(step)?;
                self.await_element(selector).await?;
                self.driver.click(selector).await?;
                Ok(None)
            }
            Action::Type { value } => {
                let selector = self.require_selector(step)?;
                self.await_element(selector).await?;
                self.driver.fill(selector, value).await?;
                Ok(None)
            }
            Action::PasswordEntry => {
                let value = value_override.ok_or_else(|| {
                    InterpretError::Session("password step reached without a secret".to_string())
                })?;
                let selector = self.require_selector(step)?;
                self.await_element(selector).await?;
                debug!(step = step.index, value = "********", "Typing password");
                self.driver.fill(selector, value).await?;
                Ok(None)
            }
            Action::Select { value } => {
                let selector = self.require_selector(step)?;
                self.await_element(selector).await?;
                self.driver.select(selector, value).await?;
                Ok(None)
            }
            Action::Scroll { x, y } => {
                match step.selector.as_ref().filter(|s| !s.is_empty()) {
                    Some(selector) => self.scroll_until_visible(selector, *x, *y).await?,
                    None => self.driver.scroll_by(*x, *y).await?,
                }
                Ok(None)
            }
            Action::KeyPress { key } => {
                let selector = match step.selector.as_ref().filter(|s| !s.is_empty()) {
                    Some(selector) => {
                        self.await_element(selector).await?;
                        selector.clone()
                    }
                    None => Selector::default(),
                };
                self.driver.press_key(&selector, key).await?;
                Ok(None)
            }
            Action::Extract { goal } => {
                let value = self.extract(step.index, goal).await?;
                Ok(Some(value))
            }
        }
    }

    fn require_selector<'s>(&self, step: &'s Step) -> Result<&'s Selector, InterpretError> {
        step.selector
            .as_ref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                StepFailure::unsupported(format!(
                    "{} step has no selector",
                    step.action.kind()
                ))
                .into()
            })
    }

    /// Wait for the target element; a timeout here means the element never
    /// appeared, which is the repairable condition.
    async fn await_element(&self, selector: &Selector) -> Result<(), InterpretError> {
        match self
            .driver
            .wait_for(selector, self.config.element_timeout)
            .await
        {
            Ok(()) => Ok(()),
            Err(DriverError::Timeout(_)) => Err(StepFailure::element_not_found(format!(
                "element did not appear: {}",
                selector.describe()
            ))
            .into()),
            Err(e) => Err(e.into()),
        }
    }

    /// Scroll in bounded increments until the target element is visible.
    async fn scroll_until_visible(
        &self,
        selector: &Selector,
        dx: f64,
        dy: f64,
    ) -> Result<(), InterpretError> {
        for _ in 0..self.config.scroll_attempts {
            if self.driver.is_visible(selector).await? {
                return Ok(());
            }
            self.driver.scroll_by(dx, dy).await?;
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        }

        if self.driver.is_visible(selector).await? {
            return Ok(());
        }
        Err(StepFailure::element_not_found(format!(
            "element not visible after scrolling: {}",
            selector.describe()
        ))
        .into())
    }

    /// Run an extraction prompt over the page's visible text.
    async fn extract(&self, step_index: usize, goal: &str) -> Result<Value, InterpretError> {
        let text = self
            .driver
            .visible_text(self.config.extract_max_chars)
            .await?;

        let request = CompletionRequest::new(format!(
            "Extract the following from the page content below.\n\
             Goal: {goal}\n\n\
             Page content:\n{text}\n\n\
             Return ONLY a valid JSON object with the extracted data."
        ))
        .with_system("You extract structured data from web pages. Return ONLY valid JSON.")
        .with_temperature(0.0)
        .with_json_output();

        let response = self.model.complete(request).await.map_err(|e| {
            InterpretError::Step(StepFailure::assertion_mismatch(format!(
                "extraction failed: {}",
                e
            )))
        })?;

        let value: Value = serde_json::from_str(response.trim()).map_err(|e| {
            InterpretError::Step(StepFailure::assertion_mismatch(format!(
                "extraction returned invalid JSON: {}",
                e
            )))
        })?;

        debug!(step = step_index, "Extraction complete");
        Ok(value)
    }
}
