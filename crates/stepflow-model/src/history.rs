//! Records produced while an exchange moves through a route.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::exchange::Exchange;
use crate::message::BODY_PREVIEW_LIMIT;

/// One step in an exchange's message history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageHistory {
    /// Route the step belongs to.
    pub route_id: String,
    /// Node the step executed.
    pub node_id: String,
    /// Node that was current when this step was entered, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_node_id: Option<String>,
    /// Position in the exchange's history, strictly increasing.
    pub index: u64,
    /// Entry timestamp (Unix milliseconds).
    pub timestamp: i64,
    /// Time spent in the node, filled in on exit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

impl MessageHistory {
    pub fn new(
        route_id: impl Into<String>,
        node_id: impl Into<String>,
        parent_node_id: Option<String>,
        index: u64,
    ) -> Self {
        Self {
            route_id: route_id.into(),
            node_id: node_id.into(),
            parent_node_id,
            index,
            timestamp: Utc::now().timestamp_millis(),
            elapsed_ms: None,
        }
    }

    /// Close the step, recording how long the node ran.
    pub fn finish(&mut self) {
        let elapsed = Utc::now().timestamp_millis() - self.timestamp;
        self.elapsed_ms = Some(elapsed.max(0) as u64);
    }
}

/// The node an exchange is currently inside, kept for failure diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurrentNode {
    pub route_id: String,
    pub node_id: String,
    pub label: String,
    /// `location:line` of the node, when the definition carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Snapshot captured by the backlog tracer for one node traversal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BacklogTraceEvent {
    /// Tracer-assigned sequence id, strictly increasing per tracer.
    pub uid: u64,
    pub route_id: String,
    /// Traversed node; `None` marks the route-input pseudo-event emitted
    /// ahead of the first node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub exchange_id: String,
    /// Capture timestamp (Unix milliseconds).
    pub timestamp: i64,
    /// Short body rendering; streams are never consumed for snapshots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl BacklogTraceEvent {
    pub fn node(
        uid: u64,
        route_id: impl Into<String>,
        node_id: impl Into<String>,
        exchange: &Exchange,
    ) -> Self {
        Self {
            uid,
            route_id: route_id.into(),
            node_id: Some(node_id.into()),
            exchange_id: exchange.id.clone(),
            timestamp: Utc::now().timestamp_millis(),
            body: exchange.message.body().preview(BODY_PREVIEW_LIMIT),
        }
    }

    pub fn route_input(uid: u64, route_id: impl Into<String>, exchange: &Exchange) -> Self {
        Self {
            uid,
            route_id: route_id.into(),
            node_id: None,
            exchange_id: exchange.id.clone(),
            timestamp: Utc::now().timestamp_millis(),
            body: exchange.message.body().preview(BODY_PREVIEW_LIMIT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Body;

    #[test]
    fn finish_records_non_negative_elapsed() {
        let mut step = MessageHistory::new("orders", "n1", None, 0);
        step.finish();
        assert!(step.elapsed_ms.is_some());
    }

    #[test]
    fn trace_event_snapshots_body() {
        let mut exchange = Exchange::new();
        exchange.message.set_body(Body::Text("payload".into()));
        let event = BacklogTraceEvent::node(7, "orders", "n1", &exchange);
        assert_eq!(event.uid, 7);
        assert_eq!(event.node_id.as_deref(), Some("n1"));
        assert_eq!(event.body.as_deref(), Some("payload"));
    }

    #[test]
    fn route_input_event_has_no_node() {
        let exchange = Exchange::new();
        let event = BacklogTraceEvent::route_input(1, "orders", &exchange);
        assert!(event.node_id.is_none());
        assert_eq!(event.route_id, "orders");
    }
}
