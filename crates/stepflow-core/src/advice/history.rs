use std::sync::Arc;

use async_trait::async_trait;

use stepflow_model::{CurrentNode, Exchange, NodeDefinition, Result};
use stepflow_traits::{Advice, AdviceToken, MessageHistoryFactory};

/// Records a per-node entry in the exchange's message history.
///
/// Must run its `before` while the exchange still points at the previous
/// node, so the channel registers it ahead of [`NodeHistoryAdvice`]; the
/// previous node's id becomes the new entry's parent.
pub struct MessageHistoryAdvice {
    factory: Arc<dyn MessageHistoryFactory>,
    route_id: String,
    def: Arc<NodeDefinition>,
}

impl MessageHistoryAdvice {
    pub fn new(
        factory: Arc<dyn MessageHistoryFactory>,
        route_id: impl Into<String>,
        def: Arc<NodeDefinition>,
    ) -> Self {
        Self {
            factory,
            route_id: route_id.into(),
            def,
        }
    }
}

#[async_trait]
impl Advice for MessageHistoryAdvice {
    fn name(&self) -> &str {
        "message-history"
    }

    async fn before(&self, exchange: &mut Exchange) -> Result<AdviceToken> {
        // The previous node, unless the exchange already points at this
        // one (the route-input record has no parent).
        let parent = exchange
            .current_node()
            .filter(|node| node.node_id != self.def.id)
            .map(|node| node.node_id.clone());
        let index = exchange.next_sequence();
        let Some(step) = self
            .factory
            .new_history(&self.route_id, &self.def, parent, index)
        else {
            return Ok(None);
        };
        let position = exchange.add_history(step);
        Ok(Some(Box::new(position)))
    }

    async fn after(&self, exchange: &mut Exchange, token: AdviceToken) -> Result<()> {
        if let Some(token) = token
            && let Ok(position) = token.downcast::<usize>()
        {
            exchange.finish_history(*position);
        }
        Ok(())
    }
}

/// Keeps the exchange's notion of "where am I" up to date.
///
/// Always registered, even when tracing and history are off, so error
/// handlers and debuggers can report the failing node.
pub struct NodeHistoryAdvice {
    route_id: String,
    def: Arc<NodeDefinition>,
}

impl NodeHistoryAdvice {
    pub fn new(route_id: impl Into<String>, def: Arc<NodeDefinition>) -> Self {
        Self {
            route_id: route_id.into(),
            def,
        }
    }
}

#[async_trait]
impl Advice for NodeHistoryAdvice {
    fn name(&self) -> &str {
        "node-history"
    }

    async fn before(&self, exchange: &mut Exchange) -> Result<AdviceToken> {
        let source = self.def.location.as_ref().map(|location| {
            match self.def.line {
                Some(line) => format!("{location}:{line}"),
                None => location.clone(),
            }
        });
        exchange.set_current_node(CurrentNode {
            route_id: self.route_id.clone(),
            node_id: self.def.id.clone(),
            label: self.def.label().to_string(),
            source,
        });
        Ok(None)
    }

    async fn after(&self, _exchange: &mut Exchange, _token: AdviceToken) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepflow_model::MessageHistory;

    struct AlwaysFactory;

    impl MessageHistoryFactory for AlwaysFactory {
        fn new_history(
            &self,
            route_id: &str,
            def: &NodeDefinition,
            parent_node_id: Option<String>,
            index: u64,
        ) -> Option<MessageHistory> {
            Some(MessageHistory::new(route_id, &def.id, parent_node_id, index))
        }
    }

    #[tokio::test]
    async fn parent_comes_from_the_previous_node() {
        let factory: Arc<dyn MessageHistoryFactory> = Arc::new(AlwaysFactory);
        let first = Arc::new(NodeDefinition::new("n1"));
        let second = Arc::new(NodeDefinition::new("n2"));

        let mut exchange = Exchange::new();

        let history_1 = MessageHistoryAdvice::new(factory.clone(), "r1", first.clone());
        let position_1 = NodeHistoryAdvice::new("r1", first);
        let token = history_1.before(&mut exchange).await.unwrap();
        position_1.before(&mut exchange).await.unwrap();
        history_1.after(&mut exchange, token).await.unwrap();

        let history_2 = MessageHistoryAdvice::new(factory, "r1", second.clone());
        let position_2 = NodeHistoryAdvice::new("r1", second);
        let token = history_2.before(&mut exchange).await.unwrap();
        position_2.before(&mut exchange).await.unwrap();
        history_2.after(&mut exchange, token).await.unwrap();

        let history = exchange.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].node_id, "n1");
        assert_eq!(history[0].parent_node_id, None);
        assert_eq!(history[1].node_id, "n2");
        assert_eq!(history[1].parent_node_id.as_deref(), Some("n1"));
        assert!(history[0].index < history[1].index);
        assert!(history.iter().all(|step| step.elapsed_ms.is_some()));
    }

    #[tokio::test]
    async fn current_node_carries_source_location() {
        let def = Arc::new(NodeDefinition::new("n9").with_location("file:flows/demo.yaml", 42));
        let advice = NodeHistoryAdvice::new("r1", def);

        let mut exchange = Exchange::new();
        advice.before(&mut exchange).await.unwrap();

        let current = exchange.current_node().unwrap();
        assert_eq!(current.node_id, "n9");
        assert_eq!(current.source.as_deref(), Some("file:flows/demo.yaml:42"));
    }
}
