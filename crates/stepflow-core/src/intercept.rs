//! Applies interceptor strategies around a channel's target.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task;
use tracing::{debug, warn};

use stepflow_model::{Exchange, FlowError, NodeDefinition, Result};
use stepflow_traits::{
    BlockingProcessor, InterceptStrategy, InterceptorOutput, Processor, SharedProcessor,
};

/// Wrap `target` with the configured interceptor strategies.
///
/// Strategies are sorted by order key (stable, ties keep declaration
/// order) and applied innermost-first, so the first declared strategy ends
/// up outermost and runs first on entry. Only the outermost wrap receives
/// the real next processor; inner wraps get `None` and cannot reach past
/// their immediate neighbor. Skipped entirely when the target declares
/// itself non-interceptable.
pub(crate) fn apply_interceptors(
    def: &NodeDefinition,
    interceptors: &[Arc<dyn InterceptStrategy>],
    next: SharedProcessor,
) -> Result<SharedProcessor> {
    if !next.is_interceptable() {
        if !interceptors.is_empty() {
            debug!(node_id = %def.id, "target not interceptable, skipping interceptor wrapping");
        }
        return Ok(next);
    }

    let mut ordered: Vec<&Arc<dyn InterceptStrategy>> = interceptors.iter().collect();
    ordered.sort_by_key(|strategy| strategy.order());

    let mut target = next.clone();
    for (position, strategy) in ordered.iter().enumerate().rev() {
        let outermost = position == 0;
        let next_for_wrap = if outermost { Some(next.clone()) } else { None };
        let wrapped = strategy.wrap(def, target.clone(), next_for_wrap)?;
        target = match wrapped {
            InterceptorOutput::WrapAware(processor) => processor,
            InterceptorOutput::Async(processor) => Arc::new(LifecycleWrap {
                processor,
                target: target.clone(),
            }),
            InterceptorOutput::Blocking(processor) => {
                warn!(
                    interceptor = %strategy.name(),
                    node_id = %def.id,
                    "interceptor returned a blocking processor, bridging onto the blocking pool"
                );
                Arc::new(LifecycleWrap {
                    processor: Arc::new(BlockingBridge { inner: processor }),
                    target: target.clone(),
                })
            }
        };
    }
    Ok(target)
}

/// Makes a processor-only interceptor result lifecycle-manageable:
/// start/stop cascade to both the wrapping processor and the target it
/// wrapped.
struct LifecycleWrap {
    processor: SharedProcessor,
    target: SharedProcessor,
}

#[async_trait]
impl Processor for LifecycleWrap {
    async fn process(&self, exchange: &mut Exchange) -> Result<()> {
        self.processor.process(exchange).await
    }

    async fn start(&self) -> Result<()> {
        self.processor.start().await?;
        self.target.start().await
    }

    async fn stop(&self) -> Result<()> {
        if !self.processor.is_context_scoped() {
            self.processor.stop().await?;
        }
        if !self.target.is_context_scoped() {
            self.target.stop().await?;
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        if !self.processor.is_context_scoped() {
            self.processor.shutdown().await?;
        }
        if !self.target.is_context_scoped() {
            self.target.shutdown().await?;
        }
        Ok(())
    }

    fn is_interceptable(&self) -> bool {
        self.processor.is_interceptable()
    }
}

/// Runs a blocking-only processor on the blocking pool so async workers
/// are never stalled. The exchange is moved across and restored.
struct BlockingBridge {
    inner: Arc<dyn BlockingProcessor>,
}

#[async_trait]
impl Processor for BlockingBridge {
    async fn process(&self, exchange: &mut Exchange) -> Result<()> {
        let inner = self.inner.clone();
        let mut moved = std::mem::take(exchange);
        let (moved, result) = task::spawn_blocking(move || {
            let result = inner.process_blocking(&mut moved);
            (moved, result)
        })
        .await
        .map_err(|e| FlowError::processing(format!("blocking bridge task failed: {e}")))?;
        *exchange = moved;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use parking_lot::Mutex;

    type Trace = Arc<Mutex<Vec<String>>>;

    struct Terminal {
        trace: Trace,
        interceptable: bool,
        started: AtomicBool,
    }

    impl Terminal {
        fn new(trace: &Trace) -> Self {
            Self {
                trace: trace.clone(),
                interceptable: true,
                started: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl Processor for Terminal {
        async fn process(&self, _exchange: &mut Exchange) -> Result<()> {
            self.trace.lock().push("target".to_string());
            Ok(())
        }

        async fn start(&self) -> Result<()> {
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn is_interceptable(&self) -> bool {
            self.interceptable
        }
    }

    struct Marker {
        name: String,
        inner: SharedProcessor,
        trace: Trace,
        started: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Processor for Marker {
        async fn process(&self, exchange: &mut Exchange) -> Result<()> {
            self.trace.lock().push(format!("{}:enter", self.name));
            self.inner.process(exchange).await?;
            self.trace.lock().push(format!("{}:leave", self.name));
            Ok(())
        }

        async fn start(&self) -> Result<()> {
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct MarkerStrategy {
        name: String,
        order: i32,
        trace: Trace,
        wraps: AtomicUsize,
        started: Arc<AtomicBool>,
    }

    impl MarkerStrategy {
        fn new(name: &str, order: i32, trace: &Trace) -> Self {
            Self {
                name: name.to_string(),
                order,
                trace: trace.clone(),
                wraps: AtomicUsize::new(0),
                started: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl InterceptStrategy for MarkerStrategy {
        fn name(&self) -> &str {
            &self.name
        }

        fn order(&self) -> i32 {
            self.order
        }

        fn wrap(
            &self,
            _def: &NodeDefinition,
            target: SharedProcessor,
            next: Option<SharedProcessor>,
        ) -> Result<InterceptorOutput> {
            self.wraps.fetch_add(1, Ordering::SeqCst);
            self.trace
                .lock()
                .push(format!("{}:next={}", self.name, next.is_some()));
            Ok(InterceptorOutput::Async(Arc::new(Marker {
                name: self.name.clone(),
                inner: target,
                trace: self.trace.clone(),
                started: self.started.clone(),
            })))
        }
    }

    struct BlockingDouble;

    impl BlockingProcessor for BlockingDouble {
        fn process_blocking(&self, exchange: &mut Exchange) -> Result<()> {
            exchange.set_property("bridged", true);
            Ok(())
        }
    }

    struct BlockingStrategy;

    impl InterceptStrategy for BlockingStrategy {
        fn name(&self) -> &str {
            "blocking"
        }

        fn wrap(
            &self,
            _def: &NodeDefinition,
            _target: SharedProcessor,
            _next: Option<SharedProcessor>,
        ) -> Result<InterceptorOutput> {
            Ok(InterceptorOutput::Blocking(Arc::new(BlockingDouble)))
        }
    }

    fn def() -> NodeDefinition {
        NodeDefinition::new("n1")
    }

    #[tokio::test]
    async fn first_declared_strategy_is_outermost() {
        let trace: Trace = Trace::default();
        let outer = Arc::new(MarkerStrategy::new("outer", 0, &trace));
        let inner = Arc::new(MarkerStrategy::new("inner", 0, &trace));
        let strategies: Vec<Arc<dyn InterceptStrategy>> = vec![outer, inner];

        let target = apply_interceptors(
            &def(),
            &strategies,
            Arc::new(Terminal::new(&trace)),
        )
        .unwrap();
        trace.lock().clear();

        let mut exchange = Exchange::new();
        target.process(&mut exchange).await.unwrap();
        assert_eq!(
            *trace.lock(),
            vec![
                "outer:enter",
                "inner:enter",
                "target",
                "inner:leave",
                "outer:leave"
            ]
        );
    }

    #[tokio::test]
    async fn order_key_overrides_declaration_order() {
        let trace: Trace = Trace::default();
        let late = Arc::new(MarkerStrategy::new("late", 10, &trace));
        let early = Arc::new(MarkerStrategy::new("early", -10, &trace));
        let strategies: Vec<Arc<dyn InterceptStrategy>> = vec![late, early];

        let target = apply_interceptors(
            &def(),
            &strategies,
            Arc::new(Terminal::new(&trace)),
        )
        .unwrap();
        trace.lock().clear();

        let mut exchange = Exchange::new();
        target.process(&mut exchange).await.unwrap();
        assert_eq!(trace.lock().first().map(String::as_str), Some("early:enter"));
    }

    #[tokio::test]
    async fn only_the_outermost_wrap_sees_the_next_processor() {
        let trace: Trace = Trace::default();
        let outer = Arc::new(MarkerStrategy::new("outer", 0, &trace));
        let inner = Arc::new(MarkerStrategy::new("inner", 0, &trace));
        let strategies: Vec<Arc<dyn InterceptStrategy>> = vec![outer, inner];

        apply_interceptors(&def(), &strategies, Arc::new(Terminal::new(&trace))).unwrap();

        let wrap_log = trace.lock().clone();
        // Wrapping happens innermost-first.
        assert_eq!(wrap_log, vec!["inner:next=false", "outer:next=true"]);
    }

    #[tokio::test]
    async fn blocking_result_is_bridged() {
        let trace: Trace = Trace::default();
        let strategies: Vec<Arc<dyn InterceptStrategy>> = vec![Arc::new(BlockingStrategy)];

        let target = apply_interceptors(
            &def(),
            &strategies,
            Arc::new(Terminal::new(&trace)),
        )
        .unwrap();

        let mut exchange = Exchange::new();
        exchange.message.set_body(stepflow_model::Body::Text("payload".into()));
        target.process(&mut exchange).await.unwrap();

        assert_eq!(exchange.property("bridged"), Some(&true.into()));
        // The exchange moved to the blocking pool and back intact.
        assert!(matches!(exchange.message.body(), stepflow_model::Body::Text(s) if s == "payload"));
    }

    #[tokio::test]
    async fn non_interceptable_target_skips_wrapping() {
        let trace: Trace = Trace::default();
        let strategy = Arc::new(MarkerStrategy::new("outer", 0, &trace));
        let wraps = |s: &Arc<MarkerStrategy>| s.wraps.load(Ordering::SeqCst);
        let strategies: Vec<Arc<dyn InterceptStrategy>> = vec![strategy.clone()];

        let next: SharedProcessor = Arc::new(Terminal {
            interceptable: false,
            ..Terminal::new(&trace)
        });
        let target = apply_interceptors(&def(), &strategies, next.clone()).unwrap();

        assert!(Arc::ptr_eq(&target, &next));
        assert_eq!(wraps(&strategy), 0);
    }

    #[tokio::test]
    async fn lifecycle_cascades_through_the_wrap() {
        let trace: Trace = Trace::default();
        let strategy = Arc::new(MarkerStrategy::new("outer", 0, &trace));
        let strategies: Vec<Arc<dyn InterceptStrategy>> = vec![strategy.clone()];

        let terminal = Arc::new(Terminal::new(&trace));
        let target = apply_interceptors(&def(), &strategies, terminal.clone()).unwrap();
        target.start().await.unwrap();

        assert!(strategy.started.load(Ordering::SeqCst));
        assert!(terminal.started.load(Ordering::SeqCst));
    }
}
