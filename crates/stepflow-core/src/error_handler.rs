//! First-party error handler with bounded immediate redelivery.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use stepflow_model::{Exchange, Result};
use stepflow_traits::{
    ErrorHandler, ErrorHandlerFactory, Processor, RedeliveryCustomizer, SharedProcessor,
};

/// Re-invokes its output up to `max_redeliveries` extra times while the
/// exchange keeps coming back failed.
///
/// Works on the exception slot, not on `Err` returns: the advice pipeline
/// inside has already transferred a target failure into the slot and
/// returned `Ok`. An `Err` reaching this handler is an engine fault and
/// propagates untouched. When the attempts are exhausted the exchange is
/// left failed for the dispatcher to stop on.
pub struct DefaultErrorHandler {
    max_redeliveries: u32,
    output: Mutex<SharedProcessor>,
}

impl DefaultErrorHandler {
    pub fn new(max_redeliveries: u32, output: SharedProcessor) -> Self {
        Self {
            max_redeliveries,
            output: Mutex::new(output),
        }
    }
}

#[async_trait]
impl Processor for DefaultErrorHandler {
    async fn process(&self, exchange: &mut Exchange) -> Result<()> {
        let output = self.output.lock().clone();
        output.process(exchange).await?;

        let mut attempt = 0;
        while exchange.is_failed() && attempt < self.max_redeliveries {
            attempt += 1;
            if let Some(error) = exchange.take_exception() {
                debug!(attempt, error = %error, "redelivering failed exchange");
            }
            output.process(exchange).await?;
        }

        if let Some(error) = exchange.exception() {
            warn!(
                attempts = attempt + 1,
                error = %error,
                "exchange still failed after redelivery"
            );
        }
        Ok(())
    }
}

impl RedeliveryCustomizer for DefaultErrorHandler {
    fn redelivery_enabled(&self) -> bool {
        self.max_redeliveries > 0
    }

    fn output(&self) -> SharedProcessor {
        self.output.lock().clone()
    }

    fn change_output(&self, output: SharedProcessor) {
        *self.output.lock() = output;
    }
}

impl ErrorHandler for DefaultErrorHandler {
    fn redelivery(&self) -> Option<&dyn RedeliveryCustomizer> {
        Some(self)
    }
}

/// Builds a [`DefaultErrorHandler`] around each channel's chain.
pub struct DefaultErrorHandlerFactory {
    max_redeliveries: u32,
}

impl DefaultErrorHandlerFactory {
    pub fn new(max_redeliveries: u32) -> Self {
        Self { max_redeliveries }
    }
}

impl ErrorHandlerFactory for DefaultErrorHandlerFactory {
    fn create(&self, output: SharedProcessor) -> Result<Arc<dyn ErrorHandler>> {
        Ok(Arc::new(DefaultErrorHandler::new(
            self.max_redeliveries,
            output,
        )))
    }
}
