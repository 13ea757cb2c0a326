//! Reweave protocol layer.
//!
//! Shared data model (workflows, steps, patches, run status), the error
//! taxonomy, and the trait seams between the replay engine and its
//! collaborators: the browser ([`driver::PageDriver`]), the document store
//! ([`store::WorkflowStore`]), and the LLM ([`model::LanguageModel`]).

pub mod driver;
pub mod error;
pub mod model;
pub mod run;
pub mod secrets;
pub mod store;
pub mod workflow;

pub use driver::{ElementSummary, PageDriver, PageSnapshot};
pub use error::{
    DriverError, FailureKind, ModelError, PersistenceFailure, RunError, StepFailure, StoreError,
};
pub use model::{CompletionRequest, LanguageModel};
pub use run::{Extraction, RunReport, RunState, RunStatus};
pub use secrets::RunSecrets;
pub use store::{WorkflowStore, WorkflowSummary};
pub use workflow::{Action, RepairProposal, Selector, Step, StepPatch, Workflow, WorkflowMetadata};
