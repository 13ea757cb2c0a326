//! Workflow and step definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Element locator recorded for a step.
///
/// Recorders capture both a CSS selector and an XPath where available;
/// the browser layer tries them in that order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selector {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
}

impl Selector {
    /// Selector from a CSS expression.
    pub fn css(css: impl Into<String>) -> Self {
        Self {
            css: Some(css.into()),
            xpath: None,
        }
    }

    /// Selector from an XPath expression.
    pub fn xpath(xpath: impl Into<String>) -> Self {
        Self {
            css: None,
            xpath: Some(xpath.into()),
        }
    }

    /// True when no locator was recorded at all.
    pub fn is_empty(&self) -> bool {
        self.css.is_none() && self.xpath.is_none()
    }

    /// Human-readable form for diagnostics and repair prompts.
    pub fn describe(&self) -> String {
        match (&self.css, &self.xpath) {
            (Some(css), _) => css.clone(),
            (None, Some(xpath)) => format!("xpath={xpath}"),
            (None, None) => "<no selector>".to_string(),
        }
    }
}

/// One recorded action, tagged by kind.
///
/// Each variant carries only the fields that action needs. `PasswordEntry`
/// deliberately carries no value: the typed value comes exclusively from the
/// run-time secret map and is never part of the stored workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Navigate { url: String },
    Click,
    Type { value: String },
    Select { value: String },
    Scroll { x: f64, y: f64 },
    KeyPress { key: String },
    Extract { goal: String },
    PasswordEntry,
}

impl Action {
    /// Stable kind name, matching the serialized tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Navigate { .. } => "navigate",
            Action::Click => "click",
            Action::Type { .. } => "type",
            Action::Select { .. } => "select",
            Action::Scroll { .. } => "scroll",
            Action::KeyPress { .. } => "key_press",
            Action::Extract { .. } => "extract",
            Action::PasswordEntry => "password_entry",
        }
    }

    /// Whether this action targets a specific element.
    pub fn needs_selector(&self) -> bool {
        matches!(
            self,
            Action::Click
                | Action::Type { .. }
                | Action::Select { .. }
                | Action::KeyPress { .. }
                | Action::PasswordEntry
        )
    }
}

/// One step of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Zero-based position in the recorded sequence.
    pub index: usize,
    #[serde(flatten)]
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<Selector>,
    /// Free-text description, shown in UIs and fed to the repair prompt as
    /// the step's original intent.
    #[serde(default)]
    pub description: String,
}

impl Step {
    pub fn new(index: usize, action: Action) -> Self {
        Self {
            index,
            action,
            selector: None,
            description: String::new(),
        }
    }

    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Workflow document metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    pub step_count: usize,
    #[serde(default)]
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enhanced_at: Option<DateTime<Utc>>,
}

/// A stored workflow: an ordered, named sequence of steps plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requires_password: bool,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub metadata: WorkflowMetadata,
}

impl Workflow {
    /// True if any step types into a password field.
    pub fn has_password_step(&self) -> bool {
        self.steps
            .iter()
            .any(|s| matches!(s.action, Action::PasswordEntry))
    }
}

/// A healed-step replacement, recorded as a patch against the stored
/// workflow. The original step is replaced wholesale by `step`; the recorded
/// intent stays recoverable from version history because patches are applied
/// by the store, never silently in place by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepPatch {
    pub step_index: usize,
    pub step: Step,
    /// Why the repair model chose this replacement.
    pub rationale: String,
}

/// A candidate replacement for a failed step, proposed by the repair model.
/// Consumed immediately by the replay controller; never stored on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairProposal {
    pub step: Step,
    pub rationale: String,
}

impl RepairProposal {
    /// Convert into the patch that gets persisted once the proposal works.
    pub fn into_patch(self) -> StepPatch {
        StepPatch {
            step_index: self.step.index,
            step: self.step,
            rationale: self.rationale,
        }
    }
}
