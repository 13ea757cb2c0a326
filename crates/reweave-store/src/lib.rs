//! Reweave workflow persistence.
//!
//! [`JsonWorkflowStore`] keeps one JSON document per workflow on disk;
//! [`MemoryWorkflowStore`] backs tests. Both implement
//! [`reweave_protocols::WorkflowStore`] and share the patch application in
//! [`patch`].

pub mod json;
pub mod memory;
pub mod patch;

pub use json::JsonWorkflowStore;
pub use memory::MemoryWorkflowStore;
pub use patch::apply_patches;
