//! Observability strategies consumed by the channel's advices.
//!
//! The engine only defines the interfaces; the surrounding system injects
//! concrete instances at route construction time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use stepflow_model::{BacklogTraceEvent, Exchange, MessageHistory, NodeDefinition, Result};

/// Line tracer writing per-node events to a sink as the exchange moves.
#[async_trait]
pub trait Tracer: Send + Sync {
    fn is_enabled(&self) -> bool {
        true
    }

    /// Whether this node should be traced at all.
    fn should_trace(&self, def: &NodeDefinition) -> bool;

    /// Route boundary notification, fired before the first node's own
    /// trace. Not a node trace record.
    async fn trace_before_route(&self, _route_id: &str, _exchange: &Exchange) -> Result<()> {
        Ok(())
    }

    /// Route boundary notification, fired after the first node's own
    /// trace unwinds.
    async fn trace_after_route(&self, _route_id: &str, _exchange: &Exchange) -> Result<()> {
        Ok(())
    }

    async fn trace_before(
        &self,
        route_id: &str,
        def: &NodeDefinition,
        exchange: &Exchange,
    ) -> Result<()>;

    async fn trace_after(
        &self,
        route_id: &str,
        def: &NodeDefinition,
        exchange: &Exchange,
        elapsed: Duration,
    ) -> Result<()>;
}

/// Bounded, queryable history of recent node traversals.
#[async_trait]
pub trait BacklogTracer: Send + Sync {
    fn is_enabled(&self) -> bool {
        true
    }

    fn should_trace(&self, def: &NodeDefinition) -> bool;

    /// Tracer-owned counter for event uids, strictly increasing.
    fn next_uid(&self) -> u64;

    async fn trace_event(&self, event: BacklogTraceEvent) -> Result<()>;

    /// Snapshot of the retained events, oldest first.
    fn dump(&self) -> Vec<BacklogTraceEvent>;
}

/// Creates message history records; returning `None` skips the node.
pub trait MessageHistoryFactory: Send + Sync {
    fn new_history(
        &self,
        route_id: &str,
        def: &NodeDefinition,
        parent_node_id: Option<String>,
        index: u64,
    ) -> Option<MessageHistory>;
}

/// Timing hook around one node, including redelivered attempts when the
/// error handler allows splicing.
pub trait Instrumentation: Send + Sync {
    fn begin(&self, exchange: &Exchange);

    fn end(&self, exchange: &Exchange, elapsed: Duration);
}

/// Builds the per-node [`Instrumentation`] during channel construction.
pub trait InstrumentationFactory: Send + Sync {
    fn create(&self, def: &NodeDefinition) -> Arc<dyn Instrumentation>;
}
