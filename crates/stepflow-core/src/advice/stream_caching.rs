use async_trait::async_trait;

use stepflow_model::{Body, Exchange, Result, StreamCache, StreamCachingConfig};
use stepflow_traits::{Advice, AdviceToken, ORDER_STREAM_CACHING};

/// Converts one-shot stream bodies into re-readable caches on entry.
///
/// Claims the stream-caching order tier so it runs outside every
/// default-ordered advice and directly inside the node's error handler:
/// a redelivery then replays the cached body instead of a drained
/// stream. A cached body still held at exchange completion is released
/// through an on-completion hook.
pub struct StreamCachingAdvice {
    config: StreamCachingConfig,
}

impl StreamCachingAdvice {
    pub fn new(config: StreamCachingConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Advice for StreamCachingAdvice {
    fn name(&self) -> &str {
        "stream-caching"
    }

    fn order(&self) -> i32 {
        ORDER_STREAM_CACHING
    }

    async fn before(&self, exchange: &mut Exchange) -> Result<AdviceToken> {
        if !exchange.message.body().is_stream() {
            return Ok(None);
        }
        match exchange.message.take_body() {
            Body::Stream(stream) => {
                let cache = StreamCache::from_stream(
                    stream,
                    self.config.spool_threshold,
                    self.config.spool_directory.as_deref(),
                )
                .await?;
                exchange.message.set_body(Body::Cached(cache));
                exchange.add_on_completion(Box::new(|exchange| {
                    if exchange.message.body().is_cached() {
                        exchange.message.set_body(Body::Empty);
                    }
                }));
            }
            other => exchange.message.set_body(other),
        }
        Ok(None)
    }

    async fn after(&self, _exchange: &mut Exchange, _token: AdviceToken) -> Result<()> {
        Ok(())
    }
}
