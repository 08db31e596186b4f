//! The unit-of-work contract every routable step satisfies.

use std::sync::Arc;

use async_trait::async_trait;

use stepflow_model::{Exchange, Result};

/// Shared handle to a processor, safe for concurrent invocation.
pub type SharedProcessor = Arc<dyn Processor>;

/// One unit of work in a route.
///
/// `process` drives the exchange to completion for this step; awaiting the
/// returned future replaces the callback style of older engines, and the
/// future resolving exactly once is what guarantees the continuation fires
/// exactly once. Failures may either be returned as `Err` or set on the
/// exchange's exception slot; the surrounding channel treats both the same
/// way.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, exchange: &mut Exchange) -> Result<()>;

    /// Start any resources this processor owns.
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    /// Stop owned resources; must be idempotent.
    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    /// Final teardown; never restarted afterwards.
    async fn shutdown(&self) -> Result<()> {
        self.stop().await
    }

    /// Shared with the whole context; the owning route must not stop it.
    fn is_context_scoped(&self) -> bool {
        false
    }

    /// Whether interceptors may wrap this processor.
    fn is_interceptable(&self) -> bool {
        true
    }
}

/// A processor that only offers a synchronous, thread-blocking
/// implementation. Bridged onto the blocking pool by the engine so the
/// async workers are never stalled.
pub trait BlockingProcessor: Send + Sync {
    fn process_blocking(&self, exchange: &mut Exchange) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Minimal {
        stops: AtomicUsize,
    }

    impl Minimal {
        fn new() -> Self {
            Self {
                stops: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Processor for Minimal {
        async fn process(&self, _exchange: &mut Exchange) -> Result<()> {
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn shutdown_defaults_to_stop() {
        let processor = Minimal::new();
        processor.shutdown().await.unwrap();
        assert_eq!(processor.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn defaults_make_a_processor_route_owned_and_wrappable() {
        let processor = Minimal::new();
        processor.start().await.unwrap();
        assert!(!processor.is_context_scoped());
        assert!(processor.is_interceptable());
        assert_eq!(processor.stops.load(Ordering::SeqCst), 0);
    }
}
