//! Error handler abstraction the channel delegates failures to.

use std::sync::Arc;

use stepflow_model::Result;

use crate::processor::{Processor, SharedProcessor};

/// Capability of an error handler that can redeliver: its inner output can
/// be swapped so a timing wrapper sees every attempt, not just the first.
///
/// Only called during channel construction, before the route starts.
pub trait RedeliveryCustomizer: Send + Sync {
    /// Whether redelivery is actually configured, not just supported.
    fn redelivery_enabled(&self) -> bool;

    /// The processor the handler currently invokes per attempt.
    fn output(&self) -> SharedProcessor;

    /// Replace the per-attempt processor.
    fn change_output(&self, output: SharedProcessor);
}

/// External collaborator owning retry/dead-letter policy.
///
/// The channel never retries on its own; when an error handler is
/// attached it becomes the channel's entry point and wraps the whole
/// advice chain.
pub trait ErrorHandler: Processor {
    /// Declared capability hook; handlers that can redeliver return
    /// themselves so the engine can splice instrumentation inside.
    fn redelivery(&self) -> Option<&dyn RedeliveryCustomizer> {
        None
    }
}

/// Builds the per-node error handler around a channel's assembled chain.
pub trait ErrorHandlerFactory: Send + Sync {
    fn create(&self, output: SharedProcessor) -> Result<Arc<dyn ErrorHandler>>;
}
