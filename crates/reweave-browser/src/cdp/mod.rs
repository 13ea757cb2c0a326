//! Chrome DevTools Protocol client.
//!
//! A thin CDP layer: WebSocket transport with request/response correlation
//! ([`client::CdpClient`]) and per-page command surface ([`page::PageSession`]).

pub mod client;
pub mod error;
pub mod page;
pub mod protocol;

pub use client::CdpClient;
pub use error::CdpError;
pub use page::PageSession;
