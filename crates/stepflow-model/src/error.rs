//! Shared error type for the stepflow workspace.

use thiserror::Error;

use crate::breakpoint::BreakpointParseError;

pub type Result<T> = std::result::Result<T, FlowError>;

/// Errors produced while building or running a route.
///
/// Processors report failure by returning one of these; the advice
/// pipeline transfers a target failure into the exchange's exception slot
/// where the attached error handler observes it.
#[derive(Debug, Error)]
pub enum FlowError {
    /// A target processor or advice failed while handling an exchange.
    #[error("Processing failed: {0}")]
    Processing(String),

    /// Invalid route or channel wiring detected at construction time.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A service was driven through an invalid lifecycle transition.
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    #[error("Invalid breakpoint pattern: {0}")]
    Breakpoint(#[from] BreakpointParseError),

    #[error("Stream cache I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FlowError {
    /// Shorthand for processors reporting a plain failure message.
    pub fn processing(msg: impl Into<String>) -> Self {
        Self::Processing(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn lifecycle(msg: impl Into<String>) -> Self {
        Self::Lifecycle(msg.into())
    }
}
