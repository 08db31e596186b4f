use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use stepflow_model::{BacklogTraceEvent, Exchange, NodeDefinition, Result};
use stepflow_traits::{Advice, AdviceToken, BacklogTracer, Tracer};

/// Emits per-node trace events to the injected tracer.
///
/// When the advice runs for the route's first node it also fires the
/// route boundary notifications, before the node trace on the way in and
/// after it on the way out. Enablement is re-checked on every traversal
/// so a standby tracer costs one boolean per node until switched on.
pub struct TracingAdvice {
    tracer: Arc<dyn Tracer>,
    route_id: String,
    def: Arc<NodeDefinition>,
    first: bool,
}

impl TracingAdvice {
    pub fn new(
        tracer: Arc<dyn Tracer>,
        route_id: impl Into<String>,
        def: Arc<NodeDefinition>,
        first: bool,
    ) -> Self {
        Self {
            tracer,
            route_id: route_id.into(),
            def,
            first,
        }
    }
}

#[async_trait]
impl Advice for TracingAdvice {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn before(&self, exchange: &mut Exchange) -> Result<AdviceToken> {
        if !self.tracer.is_enabled() || !self.tracer.should_trace(&self.def) {
            return Ok(None);
        }
        if self.first {
            self.tracer
                .trace_before_route(&self.route_id, exchange)
                .await?;
        }
        self.tracer
            .trace_before(&self.route_id, &self.def, exchange)
            .await?;
        Ok(Some(Box::new(Instant::now())))
    }

    async fn after(&self, exchange: &mut Exchange, token: AdviceToken) -> Result<()> {
        let Some(started) = token.and_then(|token| token.downcast::<Instant>().ok()) else {
            return Ok(());
        };
        self.tracer
            .trace_after(&self.route_id, &self.def, exchange, started.elapsed())
            .await?;
        if self.first {
            self.tracer
                .trace_after_route(&self.route_id, exchange)
                .await?;
        }
        Ok(())
    }
}

/// Captures bounded snapshots of the exchange for later inspection.
///
/// Ahead of the first node it also records a route-input pseudo-event so
/// the dump shows what entered the route before any node touched it.
pub struct BacklogTracerAdvice {
    tracer: Arc<dyn BacklogTracer>,
    route_id: String,
    def: Arc<NodeDefinition>,
    first: bool,
}

impl BacklogTracerAdvice {
    pub fn new(
        tracer: Arc<dyn BacklogTracer>,
        route_id: impl Into<String>,
        def: Arc<NodeDefinition>,
        first: bool,
    ) -> Self {
        Self {
            tracer,
            route_id: route_id.into(),
            def,
            first,
        }
    }
}

#[async_trait]
impl Advice for BacklogTracerAdvice {
    fn name(&self) -> &str {
        "backlog-tracer"
    }

    async fn before(&self, exchange: &mut Exchange) -> Result<AdviceToken> {
        if !self.tracer.is_enabled() || !self.tracer.should_trace(&self.def) {
            return Ok(None);
        }
        if self.first {
            let event =
                BacklogTraceEvent::route_input(self.tracer.next_uid(), &self.route_id, exchange);
            self.tracer.trace_event(event).await?;
        }
        let event = BacklogTraceEvent::node(
            self.tracer.next_uid(),
            &self.route_id,
            &self.def.id,
            exchange,
        );
        self.tracer.trace_event(event).await?;
        Ok(None)
    }

    async fn after(&self, _exchange: &mut Exchange, _token: AdviceToken) -> Result<()> {
        Ok(())
    }
}
