use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use stepflow_model::{Exchange, Result};
use stepflow_traits::{Advice, AdviceToken, ORDER_OUTERMOST};

/// Pauses the exchange before anything else on the node runs.
///
/// Claims the outermost order tier so the pause runs ahead of every
/// other advice; under redelivery each attempt pauses again. The sleep
/// is cut short by route shutdown; a cancelled token costs nothing on
/// later traversals.
pub struct DelayerAdvice {
    delay: Duration,
    shutdown: CancellationToken,
}

impl DelayerAdvice {
    pub fn new(delay: Duration, shutdown: CancellationToken) -> Self {
        Self { delay, shutdown }
    }
}

#[async_trait]
impl Advice for DelayerAdvice {
    fn name(&self) -> &str {
        "delayer"
    }

    fn order(&self) -> i32 {
        ORDER_OUTERMOST
    }

    async fn before(&self, _exchange: &mut Exchange) -> Result<AdviceToken> {
        tokio::select! {
            _ = self.shutdown.cancelled() => {}
            _ = tokio::time::sleep(self.delay) => {}
        }
        Ok(None)
    }

    async fn after(&self, _exchange: &mut Exchange, _token: AdviceToken) -> Result<()> {
        Ok(())
    }
}
