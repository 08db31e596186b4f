//! Default message history factory.

use stepflow_model::{MessageHistory, NodeDefinition};
use stepflow_traits::MessageHistoryFactory;

/// Records a history entry for every node it is asked about.
///
/// Filtering belongs in custom factories; returning `None` from
/// `new_history` skips the node without touching the channel.
#[derive(Debug, Default)]
pub struct DefaultMessageHistoryFactory;

impl DefaultMessageHistoryFactory {
    pub fn new() -> Self {
        Self
    }
}

impl MessageHistoryFactory for DefaultMessageHistoryFactory {
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
