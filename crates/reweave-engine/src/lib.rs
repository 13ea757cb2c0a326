//! Replay engine: runs recorded workflows against a live browser and heals
//! failing steps through a language model.
//!
//! The engine is driver-agnostic: everything here talks to the browser, the
//! model, and the store through the `reweave-protocols` traits. Wiring a CDP
//! session, an OpenAI client, and a JSON store together happens in the
//! binary, not here.

pub mod config;
pub mod controller;
pub mod executor;
pub mod interpret;
pub mod persist;
pub mod repair;
pub mod runs;

pub use config::ReplayConfig;
pub use controller::ReplayController;
pub use executor::StepExecutor;
pub use interpret::{InterpretError, Interpreter};
pub use persist::RunPersistence;
pub use repair::{RepairAdvisor, Refusal};
pub use runs::{DriverFactory, RunManager};
