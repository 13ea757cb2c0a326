//! Reweave OpenAI model backend.
//!
//! Implements [`reweave_protocols::LanguageModel`] over the OpenAI
//! chat-completions API (and compatible endpoints).

pub mod api;
pub mod model;

pub use model::OpenAiModel;
