//! Nested before/after execution around a channel's target.

use async_trait::async_trait;
use tracing::warn;

use stepflow_model::{Exchange, Result};
use stepflow_traits::{Advice, AdviceToken, Processor, SharedProcessor};

/// Runs a channel's advices around the interceptor-wrapped target,
/// preserving stack-like nesting under asynchronous completion.
///
/// The advice list is sorted by order key at construction (stable sort, so
/// equal keys keep registration order) and never changes afterwards; the
/// pipeline carries no per-traversal state and is safe for concurrent
/// invocation by many exchanges.
pub struct AdvicePipeline {
    advices: Vec<Box<dyn Advice>>,
    target: SharedProcessor,
}

impl AdvicePipeline {
    pub fn new(mut advices: Vec<Box<dyn Advice>>, target: SharedProcessor) -> Self {
        advices.sort_by_key(|advice| advice.order());
        Self { advices, target }
    }

    pub fn advice_count(&self) -> usize {
        self.advices.len()
    }
}

#[async_trait]
impl Processor for AdvicePipeline {
    async fn process(&self, exchange: &mut Exchange) -> Result<()> {
        let mut entered: Vec<(usize, AdviceToken)> = Vec::with_capacity(self.advices.len());

        for (index, advice) in self.advices.iter().enumerate() {
            if exchange.is_stop_routing() || exchange.is_failed() {
                break;
            }
            match advice.before(exchange).await {
                Ok(token) => entered.push((index, token)),
                Err(error) => {
                    exchange.set_exception(error);
                    break;
                }
            }
        }

        let reached_target = entered.len() == self.advices.len()
            && !exchange.is_stop_routing()
            && !exchange.is_failed();
        if reached_target
            && let Err(error) = self.target.process(exchange).await
        {
            exchange.set_exception(error);
        }

        // Every entered advice unwinds; an after failure is logged here
        // and never reaches the exchange or the outer advices.
        for (index, token) in entered.into_iter().rev() {
            let advice = &self.advices[index];
            if let Err(error) = advice.after(exchange, token).await {
                warn!(advice = %advice.name(), error = %error, "advice after phase failed");
            }
        }

        Ok(())
    }

    async fn start(&self) -> Result<()> {
        self.target.start().await
    }

    async fn stop(&self) -> Result<()> {
        if self.target.is_context_scoped() {
            return Ok(());
        }
        self.target.stop().await
    }

    async fn shutdown(&self) -> Result<()> {
        if self.target.is_context_scoped() {
            return Ok(());
        }
        self.target.shutdown().await
    }
}
