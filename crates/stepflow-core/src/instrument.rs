//! Timing wrapper prepared in channel phase one and wired in phase two.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use stepflow_model::{Exchange, Result};
use stepflow_traits::{Instrumentation, Processor, SharedProcessor};

/// Wraps a processor with the injected instrumentation strategy.
///
/// The channel uses this two ways: spliced inside a redelivery-capable
/// error handler so every attempt is timed on its own, or wrapped around
/// the channel's final output when redelivery is not possible.
pub struct InstrumentationProcessor {
    instrumentation: Arc<dyn Instrumentation>,
    inner: SharedProcessor,
}

impl InstrumentationProcessor {
    pub fn new(instrumentation: Arc<dyn Instrumentation>, inner: SharedProcessor) -> Self {
        Self {
            instrumentation,
            inner,
        }
    }
}

#[async_trait]
impl Processor for InstrumentationProcessor {
    async fn process(&self, exchange: &mut Exchange) -> Result<()> {
        let started = Instant::now();
        self.instrumentation.begin(exchange);
        let result = self.inner.process(exchange).await;
        self.instrumentation.end(exchange, started.elapsed());
        result
    }

    async fn start(&self) -> Result<()> {
        self.inner.start().await
    }

    async fn stop(&self) -> Result<()> {
        if self.inner.is_context_scoped() {
            return Ok(());
        }
        self.inner.stop().await
    }

    async fn shutdown(&self) -> Result<()> {
        if self.inner.is_context_scoped() {
            return Ok(());
        }
        self.inner.shutdown().await
    }

    fn is_interceptable(&self) -> bool {
        self.inner.is_interceptable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use stepflow_model::FlowError;

    #[derive(Default)]
    struct CountingInstrumentation {
        begins: AtomicUsize,
        ends: AtomicUsize,
    }

    impl Instrumentation for CountingInstrumentation {
        fn begin(&self, _exchange: &Exchange) {
            self.begins.fetch_add(1, Ordering::SeqCst);
        }

        fn end(&self, _exchange: &Exchange, _elapsed: Duration) {
            self.ends.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FailingInner;

    #[async_trait]
    impl Processor for FailingInner {
        async fn process(&self, _exchange: &mut Exchange) -> Result<()> {
            Err(FlowError::processing("inner failed"))
        }
    }

    struct OkInner;

    #[async_trait]
    impl Processor for OkInner {
        async fn process(&self, _exchange: &mut Exchange) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn times_every_invocation() {
        let counting = Arc::new(CountingInstrumentation::default());
        let wrapped = InstrumentationProcessor::new(counting.clone(), Arc::new(OkInner));

        let mut exchange = Exchange::new();
        wrapped.process(&mut exchange).await.unwrap();
        wrapped.process(&mut exchange).await.unwrap();

        assert_eq!(counting.begins.load(Ordering::SeqCst), 2);
        assert_eq!(counting.ends.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn closes_the_span_on_failure() {
        let counting = Arc::new(CountingInstrumentation::default());
        let wrapped = InstrumentationProcessor::new(counting.clone(), Arc::new(FailingInner));

        let mut exchange = Exchange::new();
        assert!(wrapped.process(&mut exchange).await.is_err());
        assert_eq!(counting.begins.load(Ordering::SeqCst), 1);
        assert_eq!(counting.ends.load(Ordering::SeqCst), 1);
    }
}
