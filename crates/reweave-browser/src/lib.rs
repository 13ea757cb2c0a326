//! Reweave browser driver.
//!
//! Drives Chrome over the DevTools Protocol. [`BrowserSession`] launches an
//! isolated Chrome process per replay run and implements the
//! [`reweave_protocols::PageDriver`] seam the engine executes steps through.

pub mod cdp;
pub mod session;

pub use cdp::{CdpClient, CdpError, PageSession};
pub use session::{BrowserSession, SessionConfig};
