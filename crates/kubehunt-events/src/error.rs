//! Error types for the event bus.

use thiserror::Error;

/// Errors that can occur while building or running the bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// No tokio runtime was available to run deliveries on.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),
}

/// Result type for bus operations.
pub type BusResult<T> = Result<T, BusError>;
