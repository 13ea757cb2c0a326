//! Repair advisor: asks the language model for a replacement step.

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use reweave_protocols::{
    Action, CompletionRequest, LanguageModel, PageSnapshot, RepairProposal, Selector, Step,
    StepFailure,
};

/// The advisor could not produce a structurally valid replacement. Refusals
/// end the step's repair cycle; there is no internal retry.
#[derive(Debug, Error)]
#[error("{reason}")]
pub struct Refusal {
    pub reason: String,
}

impl Refusal {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Shape the model is asked to return.
#[derive(Deserialize)]
struct RepairResponse {
    #[serde(flatten)]
    action: Action,
    selector: Option<Selector>,
    #[serde(default)]
    description: Option<String>,
    rationale: String,
}

/// Proposes repaired steps from a failure and a bounded page snapshot.
pub struct RepairAdvisor<'a> {
    model: &'a dyn LanguageModel,
}

impl<'a> RepairAdvisor<'a> {
    pub fn new(model: &'a dyn LanguageModel) -> Self {
        Self { model }
    }

    /// One model call, JSON mode, strict parse. The advisor sees only the
    /// failed step, its failure classification, and the condensed snapshot;
    /// never the live page and never any secret value.
    pub async fn propose(
        &self,
        step: &Step,
        failure: &StepFailure,
        snapshot: &PageSnapshot,
    ) -> Result<RepairProposal, Refusal> {
        let step_json = serde_json::to_string_pretty(step)
            .map_err(|e| Refusal::new(format!("failed to serialize step: {}", e)))?;

        let request = CompletionRequest::new(format!(
            "A recorded browser automation step failed during replay and needs a repair.\n\n\
             Failed step:\n{step_json}\n\n\
             Step intent: {intent}\n\
             Failure: {failure}\n\n\
             Current page state:\n{snapshot}\n\
             Propose a replacement step that achieves the same intent on the current page.\n\
             Return ONLY a valid JSON object with these fields:\n\
             - \"type\": one of \"navigate\", \"click\", \"type\", \"select\", \"scroll\", \
               \"key_press\", \"extract\", \"password_entry\", plus that action's fields \
               (\"url\", \"value\", \"key\", \"goal\", \"x\"/\"y\") at the top level\n\
             - \"selector\": {{\"css\": \"...\", \"xpath\": \"...\"}} when the action targets an element\n\
             - \"rationale\": one sentence explaining the change",
            intent = if step.description.is_empty() {
                step.action.kind()
            } else {
                &step.description
            },
            snapshot = snapshot.to_prompt_string(),
        ))
        .with_system(
            "You repair failing browser automation steps. Return ONLY valid JSON, no prose.",
        )
        .with_temperature(0.0)
        .with_max_tokens(1024)
        .with_json_output();

        let response = self
            .model
            .complete(request)
            .await
            .map_err(|e| Refusal::new(format!("model error: {}", e)))?;

        let parsed: RepairResponse = serde_json::from_str(response.trim()).map_err(|e| {
            warn!(step = step.index, "Unparseable repair response: {}", e);
            Refusal::new(format!("unparseable repair response: {}", e))
        })?;

        let selector = parsed.selector.filter(|s| !s.is_empty());
        if parsed.action.needs_selector() && selector.is_none() {
            return Err(Refusal::new(format!(
                "proposed {} step is missing a selector",
                parsed.action.kind()
            )));
        }

        let replacement = Step {
            index: step.index,
            action: parsed.action,
            selector,
            description: parsed
                .description
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| step.description.clone()),
        };

        debug!(
            step = step.index,
            action = replacement.action.kind(),
            "Repair proposed"
        );

        Ok(RepairProposal {
            step: replacement,
            rationale: parsed.rationale,
        })
    }
}
