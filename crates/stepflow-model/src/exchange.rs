//! The message-in-flight container.

use std::collections::HashMap;
use std::fmt;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::error::FlowError;
use crate::history::{CurrentNode, MessageHistory};
use crate::message::{Body, Message};

/// Cleanup hook run when the exchange completes, in reverse registration
/// order. Each hook runs at most once.
pub type OnCompletion = Box<dyn FnOnce(&mut Exchange) + Send>;

/// One message travelling through a route.
///
/// Exactly one exchange flows through a channel invocation at a time;
/// exchanges are never shared across concurrent routings, so all
/// per-traversal state lives here rather than on the channel.
pub struct Exchange {
    pub id: String,
    pub message: Message,
    pub properties: HashMap<String, Value>,
    /// Creation timestamp (Unix milliseconds).
    pub created_at: i64,
    exception: Option<FlowError>,
    stop_routing: bool,
    sequence: u64,
    history: Vec<MessageHistory>,
    current_node: Option<CurrentNode>,
    on_completion: Vec<OnCompletion>,
    completed: bool,
}

impl Exchange {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message: Message::default(),
            properties: HashMap::new(),
            created_at: Utc::now().timestamp_millis(),
            exception: None,
            stop_routing: false,
            sequence: 0,
            history: Vec::new(),
            current_node: None,
            on_completion: Vec::new(),
            completed: false,
        }
    }

    pub fn with_body(body: Body) -> Self {
        let mut exchange = Self::new();
        exchange.message.set_body(body);
        exchange
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn exception(&self) -> Option<&FlowError> {
        self.exception.as_ref()
    }

    pub fn set_exception(&mut self, error: FlowError) {
        self.exception = Some(error);
    }

    pub fn take_exception(&mut self) -> Option<FlowError> {
        self.exception.take()
    }

    pub fn is_failed(&self) -> bool {
        self.exception.is_some()
    }

    /// Ask the channel to halt forward progress after the current phase.
    pub fn set_stop_routing(&mut self, stop: bool) {
        self.stop_routing = stop;
    }

    pub fn is_stop_routing(&self) -> bool {
        self.stop_routing
    }

    /// Next value of the per-exchange sequence used to index history and
    /// trace records. Strictly increasing within one exchange.
    pub fn next_sequence(&mut self) -> u64 {
        let next = self.sequence;
        self.sequence += 1;
        next
    }

    /// Append a history step and return its position for later
    /// [`finish_history`](Self::finish_history).
    pub fn add_history(&mut self, step: MessageHistory) -> usize {
        self.history.push(step);
        self.history.len() - 1
    }

    pub fn finish_history(&mut self, index: usize) {
        if let Some(step) = self.history.get_mut(index) {
            step.finish();
        }
    }

    pub fn history(&self) -> &[MessageHistory] {
        &self.history
    }

    pub fn set_current_node(&mut self, node: CurrentNode) {
        self.current_node = Some(node);
    }

    pub fn current_node(&self) -> Option<&CurrentNode> {
        self.current_node.as_ref()
    }

    /// Defer a cleanup to exchange completion. Downstream nodes and
    /// redelivery attempts run before completion, so resources registered
    /// here stay usable for the rest of the routing.
    pub fn add_on_completion(&mut self, callback: OnCompletion) {
        self.on_completion.push(callback);
    }

    /// Run completion hooks in reverse registration order. Idempotent.
    pub fn complete(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        let callbacks = std::mem::take(&mut self.on_completion);
        for callback in callbacks.into_iter().rev() {
            callback(self);
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

impl Default for Exchange {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("id", &self.id)
            .field("message", &self.message)
            .field("exception", &self.exception)
            .field("stop_routing", &self.stop_routing)
            .field("history", &self.history.len())
            .field("current_node", &self.current_node)
            .field("completed", &self.completed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn sequence_is_strictly_increasing() {
        let mut exchange = Exchange::new();
        assert_eq!(exchange.next_sequence(), 0);
        assert_eq!(exchange.next_sequence(), 1);
        assert_eq!(exchange.next_sequence(), 2);
    }

    #[test]
    fn completion_runs_hooks_in_reverse_exactly_once() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut exchange = Exchange::new();
        for name in ["first", "second"] {
            let order = order.clone();
            exchange.add_on_completion(Box::new(move |_| {
                order.lock().unwrap().push(name);
            }));
        }

        exchange.complete();
        exchange.complete();
        assert_eq!(*order.lock().unwrap(), vec!["second", "first"]);
        assert!(exchange.is_completed());
    }

    #[test]
    fn exception_slot_marks_failure() {
        let mut exchange = Exchange::new();
        assert!(!exchange.is_failed());
        exchange.set_exception(FlowError::processing("boom"));
        assert!(exchange.is_failed());
        assert!(exchange.take_exception().is_some());
        assert!(!exchange.is_failed());
    }

    #[test]
    fn history_indices_follow_insertion() {
        let mut exchange = Exchange::new();
        let first = exchange.add_history(MessageHistory::new("r", "n1", None, 0));
        let second = exchange.add_history(MessageHistory::new("r", "n2", Some("n1".into()), 1));
        assert_eq!((first, second), (0, 1));

        exchange.finish_history(first);
        assert!(exchange.history()[first].elapsed_ms.is_some());
        assert!(exchange.history()[second].elapsed_ms.is_none());
    }
}
