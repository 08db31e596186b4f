//! Per-node composition of target, advices, interceptors and error
//! handler.
//!
//! A channel is built once per node at route start and never mutated
//! afterwards. The composed output nests like this, outermost first:
//!
//! ```text
//! output()
//! └─ InstrumentationProcessor      (post_init, non-redelivering handlers)
//!    └─ ErrorHandler               (when attached)
//!       └─ AdvicePipeline
//!          ├─ DelayerAdvice        (outermost order tier)
//!          ├─ StreamCachingAdvice
//!          ├─ debug / trace / history advices
//!          └─ interceptor wraps
//!             └─ target processor
//! ```
//!
//! Redelivery-capable error handlers get the instrumentation spliced
//! inside instead, so every attempt is timed on its own.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use stepflow_model::{Exchange, FlowError, NodeDefinition, Result, RouteDefinition};
use stepflow_traits::{
    Advice, Debugger, ErrorHandler, InterceptStrategy, Instrumentation, Processor, SharedProcessor,
};

use crate::advice::{
    BacklogTracerAdvice, DebuggerAdvice, DelayerAdvice, MessageHistoryAdvice, NodeHistoryAdvice,
    StreamCachingAdvice, TracingAdvice,
};
use crate::context::EngineContext;
use crate::instrument::InstrumentationProcessor;
use crate::intercept::apply_interceptors;
use crate::lifecycle::ServiceLifecycle;
use crate::pipeline::AdvicePipeline;
use crate::route::RouteSettings;

/// One node's executable unit: the target processor wrapped with the
/// advices, interceptors and error handler the route asked for.
///
/// Construction is two-phase (`init`, then `set_error_handler` and
/// `post_init`), both behind `&mut self`; once shared as `Arc<Channel>`
/// the channel is immutable and safe for any number of concurrent
/// exchanges.
pub struct Channel {
    context: Arc<EngineContext>,
    route_id: String,
    target_def: Option<Arc<NodeDefinition>>,
    next_processor: Option<SharedProcessor>,
    chain: Option<SharedProcessor>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    instrumentation: Option<Arc<dyn Instrumentation>>,
    spliced_output: Option<SharedProcessor>,
    lifecycle: ServiceLifecycle,
}

impl Channel {
    pub fn new(context: Arc<EngineContext>) -> Self {
        Self {
            context,
            route_id: String::new(),
            target_def: None,
            next_processor: None,
            chain: None,
            error_handler: None,
            instrumentation: None,
            spliced_output: None,
            lifecycle: ServiceLifecycle::new(),
        }
    }

    /// Phase one: assemble the advice pipeline around the
    /// interceptor-wrapped target. Any error aborts route startup.
    ///
    /// `child_def` is the fine-grained definition when the node expands
    /// to one; correlation uses it over `node_def`. `is_first` marks the
    /// route's first real node, which carries the route-boundary duties
    /// of the tracing and backlog advices.
    #[allow(clippy::too_many_arguments)]
    pub fn init(
        &mut self,
        settings: &RouteSettings,
        shutdown: &CancellationToken,
        node_def: &Arc<NodeDefinition>,
        child_def: Option<&Arc<NodeDefinition>>,
        interceptors: &[Arc<dyn InterceptStrategy>],
        next: SharedProcessor,
        route_def: &RouteDefinition,
        is_first: bool,
    ) -> Result<()> {
        let target_def = child_def.unwrap_or(node_def).clone();
        self.route_id = route_def.id.clone();

        // Prepared here, wired in post_init once the error handler is
        // known.
        if let Some(factory) = self.context.instrumentation_factory() {
            self.instrumentation = Some(factory.create(&target_def));
        }

        let mut advices: Vec<Box<dyn Advice>> = Vec::new();

        // Debugger first so the regular tracer does not trace it.
        // Template and rest facade routes are never debugged.
        let debug_flagged = settings.debugging || self.context.is_debug_standby();
        let mut debug_active = false;
        if debug_flagged
            && route_def.debuggable()
            && let Some(debugger) = self.context.debugger()
        {
            self.install_initial_breakpoints(&debugger, node_def, &target_def, route_def, is_first);
            let factory = self.context.message_history_factory();
            if is_first && debugger.single_step_include_start_end() {
                // The debugger wants to suspend on the route input, so an
                // extra history/debugger pair is bound to the pseudo-node.
                let input_def = Arc::new(route_def.input.clone());
                advices.push(Box::new(MessageHistoryAdvice::new(
                    factory.clone(),
                    &self.route_id,
                    input_def.clone(),
                )));
                advices.push(Box::new(DebuggerAdvice::new(debugger.clone(), input_def)));
            }
            advices.push(Box::new(MessageHistoryAdvice::new(
                factory,
                &self.route_id,
                target_def.clone(),
            )));
            advices.push(Box::new(DebuggerAdvice::new(debugger, target_def.clone())));
            debug_active = true;
        }

        if (settings.backlog_tracing || self.context.is_backlog_tracing_standby())
            && let Some(tracer) = self.context.backlog_tracer()
        {
            advices.push(Box::new(BacklogTracerAdvice::new(
                tracer,
                &self.route_id,
                target_def.clone(),
                is_first,
            )));
        }

        if (settings.tracing || self.context.is_tracing_standby())
            && let Some(tracer) = self.context.tracer()
        {
            advices.push(Box::new(TracingAdvice::new(
                tracer,
                &self.route_id,
                target_def.clone(),
                is_first,
            )));
        }

        // The debug path already captures history.
        if !debug_active && settings.message_history {
            advices.push(Box::new(MessageHistoryAdvice::new(
                self.context.message_history_factory(),
                &self.route_id,
                target_def.clone(),
            )));
        }

        advices.push(Box::new(NodeHistoryAdvice::new(
            &self.route_id,
            target_def.clone(),
        )));

        let wrapped = apply_interceptors(&target_def, interceptors, next.clone())?;

        if settings
            .stream_caching
            .unwrap_or(self.context.stream_caching().enabled)
        {
            advices.push(Box::new(StreamCachingAdvice::new(
                self.context.stream_caching().clone(),
            )));
        }

        if let Some(delay) = settings.delay.filter(|delay| !delay.is_zero()) {
            advices.push(Box::new(DelayerAdvice::new(delay, shutdown.clone())));
        }

        let pipeline = AdvicePipeline::new(advices, wrapped);
        debug!(
            route_id = %self.route_id,
            node_id = %target_def.id,
            advices = pipeline.advice_count(),
            "channel initialized"
        );
        self.chain = Some(Arc::new(pipeline));
        self.next_processor = Some(next);
        self.target_def = Some(target_def);
        Ok(())
    }

    /// Match the registered breakpoint patterns against the node and tell
    /// the debugger which id to suspend on.
    fn install_initial_breakpoints(
        &self,
        debugger: &Arc<dyn Debugger>,
        node_def: &NodeDefinition,
        target_def: &NodeDefinition,
        route_def: &RouteDefinition,
        is_first: bool,
    ) {
        if !self.context.breakpoints().matches(node_def, is_first) {
            return;
        }
        // Suspend on the route input instead of the first node when the
        // debugger single-steps from route start.
        let node_id = if is_first && debugger.single_step_include_start_end() {
            route_def.input.id.as_str()
        } else {
            target_def.id.as_str()
        };
        debugger.add_breakpoint(node_id);
        debug!(route_id = %self.route_id, node_id = %node_id, "debugger breakpoint installed");
    }

    /// Attach the error handler built around the assembled chain. Called
    /// between `init` and `post_init`.
    pub fn set_error_handler(&mut self, error_handler: Arc<dyn ErrorHandler>) {
        self.error_handler = Some(error_handler);
    }

    pub fn error_handler(&self) -> Option<Arc<dyn ErrorHandler>> {
        self.error_handler.clone()
    }

    /// Phase two: wire the prepared instrumentation now that the error
    /// handler is known.
    ///
    /// A handler with redelivery enabled gets the timing wrapper spliced
    /// around its per-attempt output; otherwise the wrapper goes around
    /// the channel's final output, which with a single attempt amounts to
    /// the same span.
    pub fn post_init(&mut self) -> Result<()> {
        let Some(instrumentation) = self.instrumentation.clone() else {
            return Ok(());
        };
        if let Some(handler) = &self.error_handler
            && let Some(redelivery) = handler.redelivery()
            && redelivery.redelivery_enabled()
        {
            let timed = InstrumentationProcessor::new(instrumentation, redelivery.output());
            redelivery.change_output(Arc::new(timed));
            return Ok(());
        }
        let Some(output) = self.base_output() else {
            return Err(FlowError::lifecycle("channel post_init before init"));
        };
        self.spliced_output = Some(Arc::new(InstrumentationProcessor::new(
            instrumentation,
            output,
        )));
        Ok(())
    }

    fn base_output(&self) -> Option<SharedProcessor> {
        if let Some(handler) = &self.error_handler {
            let output: SharedProcessor = handler.clone();
            return Some(output);
        }
        self.chain.clone()
    }

    /// The processor the dispatcher invokes for this node: the error
    /// handler when attached, else the assembled chain. `None` only
    /// before `init`.
    pub fn output(&self) -> Option<SharedProcessor> {
        self.spliced_output.clone().or_else(|| self.base_output())
    }

    /// Whether a next processor was wired in.
    pub fn has_next(&self) -> bool {
        self.next_processor.is_some()
    }

    /// The immediate next processor, unwrapped, for external tooling.
    pub fn next(&self) -> Option<SharedProcessor> {
        self.next_processor.clone()
    }
}

#[async_trait]
impl Processor for Channel {
    async fn process(&self, exchange: &mut Exchange) -> Result<()> {
        let Some(output) = self.output() else {
            return Err(FlowError::lifecycle("channel invoked before init"));
        };
        output.process(exchange).await
    }

    async fn start(&self) -> Result<()> {
        if !self.lifecycle.to_started()? {
            return Ok(());
        }
        if let Some(handler) = &self.error_handler {
            handler.start().await?;
        }
        if let Some(chain) = &self.chain {
            chain.start().await?;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if !self.lifecycle.to_stopped() {
            return Ok(());
        }
        // Context-scoped processors are shared; their owner stops them.
        if let Some(chain) = &self.chain
            && !chain.is_context_scoped()
        {
            chain.stop().await?;
        }
        if let Some(handler) = &self.error_handler
            && !handler.is_context_scoped()
        {
            handler.stop().await?;
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        if !self.lifecycle.to_shutdown() {
            return Ok(());
        }
        if let Some(chain) = &self.chain
            && !chain.is_context_scoped()
        {
            chain.shutdown().await?;
        }
        if let Some(handler) = &self.error_handler
            && !handler.is_context_scoped()
        {
            handler.shutdown().await?;
        }
        Ok(())
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target_def {
            Some(def) => write!(f, "Channel[{}]", def.label()),
            None => write!(f, "Channel[uninitialized]"),
        }
    }
}
