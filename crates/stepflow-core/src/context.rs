//! Engine-wide strategy wiring.
//!
//! Strategies are injected here once at construction instead of being
//! looked up from a registry at channel-build time; a channel only ever
//! reads this context.

use std::sync::Arc;

use stepflow_model::stream_cache::StreamCachingConfig;
use stepflow_model::Result;
use stepflow_traits::{
    BacklogTracer, BreakpointRegistry, Debugger, InstrumentationFactory, MessageHistoryFactory,
    Tracer,
};

use crate::history::DefaultMessageHistoryFactory;

/// Shared, immutable wiring for every route built against one engine.
///
/// Standby flags install the corresponding advices on every channel even
/// when the owning route has the feature off, leaving the strategy to
/// report itself enabled later without a route restart.
pub struct EngineContext {
    debugger: Option<Arc<dyn Debugger>>,
    tracer: Option<Arc<dyn Tracer>>,
    backlog_tracer: Option<Arc<dyn BacklogTracer>>,
    message_history_factory: Arc<dyn MessageHistoryFactory>,
    instrumentation_factory: Option<Arc<dyn InstrumentationFactory>>,
    breakpoints: Arc<BreakpointRegistry>,
    debug_standby: bool,
    tracing_standby: bool,
    backlog_tracing_standby: bool,
    stream_caching: StreamCachingConfig,
}

impl EngineContext {
    pub fn new() -> Self {
        Self {
            debugger: None,
            tracer: None,
            backlog_tracer: None,
            message_history_factory: Arc::new(DefaultMessageHistoryFactory::new()),
            instrumentation_factory: None,
            breakpoints: Arc::new(BreakpointRegistry::new()),
            debug_standby: false,
            tracing_standby: false,
            backlog_tracing_standby: false,
            stream_caching: StreamCachingConfig::default(),
        }
    }

    pub fn with_debugger(mut self, debugger: Arc<dyn Debugger>) -> Self {
        self.debugger = Some(debugger);
        self
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn with_backlog_tracer(mut self, tracer: Arc<dyn BacklogTracer>) -> Self {
        self.backlog_tracer = Some(tracer);
        self
    }

    pub fn with_message_history_factory(mut self, factory: Arc<dyn MessageHistoryFactory>) -> Self {
        self.message_history_factory = factory;
        self
    }

    pub fn with_instrumentation_factory(
        mut self,
        factory: Arc<dyn InstrumentationFactory>,
    ) -> Self {
        self.instrumentation_factory = Some(factory);
        self
    }

    /// Parse and register breakpoint patterns ahead of route start, e.g.
    /// from an environment variable or debug session handshake.
    pub fn with_initial_breakpoints(self, patterns: &str) -> Result<Self> {
        self.breakpoints.register_list(patterns)?;
        Ok(self)
    }

    pub fn with_debug_standby(mut self, standby: bool) -> Self {
        self.debug_standby = standby;
        self
    }

    pub fn with_tracing_standby(mut self, standby: bool) -> Self {
        self.tracing_standby = standby;
        self
    }

    pub fn with_backlog_tracing_standby(mut self, standby: bool) -> Self {
        self.backlog_tracing_standby = standby;
        self
    }

    pub fn with_stream_caching(mut self, config: StreamCachingConfig) -> Self {
        self.stream_caching = config;
        self
    }

    pub fn debugger(&self) -> Option<Arc<dyn Debugger>> {
        self.debugger.clone()
    }

    pub fn tracer(&self) -> Option<Arc<dyn Tracer>> {
        self.tracer.clone()
    }

    pub fn backlog_tracer(&self) -> Option<Arc<dyn BacklogTracer>> {
        self.backlog_tracer.clone()
    }

    pub fn message_history_factory(&self) -> Arc<dyn MessageHistoryFactory> {
        self.message_history_factory.clone()
    }

    pub fn instrumentation_factory(&self) -> Option<Arc<dyn InstrumentationFactory>> {
        self.instrumentation_factory.clone()
    }

    pub fn breakpoints(&self) -> &Arc<BreakpointRegistry> {
        &self.breakpoints
    }

    pub fn is_debug_standby(&self) -> bool {
        self.debug_standby
    }

    pub fn is_tracing_standby(&self) -> bool {
        self.tracing_standby
    }

    pub fn is_backlog_tracing_standby(&self) -> bool {
        self.backlog_tracing_standby
    }

    pub fn stream_caching(&self) -> &StreamCachingConfig {
        &self.stream_caching
    }
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::new()
    }
}
