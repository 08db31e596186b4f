use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use stepflow_model::{Exchange, NodeDefinition, Result};
use stepflow_traits::{Advice, AdviceToken, Debugger};

/// Hands the exchange to the debugger around every node.
///
/// The debugger decides whether to suspend; nodes without a breakpoint
/// resolve immediately.
pub struct DebuggerAdvice {
    debugger: Arc<dyn Debugger>,
    def: Arc<NodeDefinition>,
}

impl DebuggerAdvice {
    pub fn new(debugger: Arc<dyn Debugger>, def: Arc<NodeDefinition>) -> Self {
        Self { debugger, def }
    }
}

#[async_trait]
impl Advice for DebuggerAdvice {
    fn name(&self) -> &str {
        "debugger"
    }

    async fn before(&self, exchange: &mut Exchange) -> Result<AdviceToken> {
        self.debugger.before_process(exchange, &self.def).await?;
        Ok(Some(Box::new(Instant::now())))
    }

    async fn after(&self, exchange: &mut Exchange, token: AdviceToken) -> Result<()> {
        let elapsed_ms = token
            .and_then(|token| token.downcast::<Instant>().ok())
            .map(|started| started.elapsed().as_millis() as u64)
            .unwrap_or(0);
        self.debugger
            .after_process(exchange, &self.def, elapsed_ms)
            .await
    }
}
