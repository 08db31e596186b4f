//! Interceptor extension point for wrapping node processors.

use std::sync::Arc;

use stepflow_model::{NodeDefinition, Result};

use crate::advice::ORDER_DEFAULT;
use crate::processor::{BlockingProcessor, SharedProcessor};

/// What an interceptor hands back from [`InterceptStrategy::wrap`].
///
/// The variant declares how the result fits the async engine instead of
/// leaving the engine to guess at runtime.
pub enum InterceptorOutput {
    /// Honors the async contract but does not manage the wrapped target's
    /// lifecycle; the engine adds a lifecycle wrap so start/stop cascade.
    Async(SharedProcessor),
    /// Honors the async contract and already cascades lifecycle to the
    /// wrapped target; used as is.
    WrapAware(SharedProcessor),
    /// Synchronous-only implementation. The engine bridges it onto the
    /// blocking pool and logs a configuration warning; startup never fails
    /// because of this.
    Blocking(Arc<dyn BlockingProcessor>),
}

/// Wraps a node's processor with additional behavior at route start.
pub trait InterceptStrategy: Send + Sync {
    /// Name used in configuration warnings.
    fn name(&self) -> &str;

    /// Sort key; lower keys end up wrapping further out. Equal keys keep
    /// their registration order, and the first declared strategy becomes
    /// the outermost wrap.
    fn order(&self) -> i32 {
        ORDER_DEFAULT
    }

    /// Wrap `target` for the node identified by `def`.
    ///
    /// `next` is the unwrapped next processor and is only passed to the
    /// outermost wrap; inner wraps receive `None` so no interceptor can
    /// reach past its immediate neighbor.
    fn wrap(
        &self,
        def: &NodeDefinition,
        target: SharedProcessor,
        next: Option<SharedProcessor>,
    ) -> Result<InterceptorOutput>;
}
