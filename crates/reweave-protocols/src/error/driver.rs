//! Browser driver errors.

use thiserror::Error;

/// Errors surfaced by a [`crate::driver::PageDriver`] implementation.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("timed out: {0}")]
    Timeout(String),

    /// The browser session itself is unusable (crashed, disconnected,
    /// navigated to oblivion). Not recoverable by a step repair.
    #[error("browser session error: {0}")]
    Session(String),

    #[error("action failed: {0}")]
    Action(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::ElementNotFound("#login".to_string());
        assert!(err.to_string().contains("element not found"));
        assert!(err.to_string().contains("#login"));

        let err = DriverError::Session("websocket closed".to_string());
        assert!(err.to_string().contains("session error"));
    }
}
