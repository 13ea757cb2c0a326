//! Error types for the Reweave protocol layer.

mod driver;
mod model;
mod run;
mod step;
mod store;

pub use driver::*;
pub use model::*;
pub use run::*;
pub use step::*;
pub use store::*;
