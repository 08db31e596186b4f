//! Debugger interface and the shared breakpoint registry.

use async_trait::async_trait;
use parking_lot::Mutex;

use stepflow_model::breakpoint::matches_any;
use stepflow_model::{BreakpointPattern, Exchange, NodeDefinition, Result};

/// Shared, lock-guarded set of pre-parsed breakpoint patterns.
///
/// Patterns are parsed exactly once when registered; traversals only read
/// the pre-parsed forms. The lock is held for the duration of one match
/// pass, never across a suspension.
#[derive(Default)]
pub struct BreakpointRegistry {
    patterns: Mutex<Vec<BreakpointPattern>>,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and register one raw pattern.
    pub fn register(&self, pattern: &str) -> Result<()> {
        let parsed = BreakpointPattern::parse(pattern)?;
        self.patterns.lock().extend(parsed);
        Ok(())
    }

    /// Parse and register a comma separated pattern list.
    pub fn register_list(&self, patterns: &str) -> Result<()> {
        let parsed = BreakpointPattern::parse_list(patterns)?;
        self.patterns.lock().extend(parsed);
        Ok(())
    }

    /// Register an already parsed pattern.
    pub fn install(&self, pattern: BreakpointPattern) {
        self.patterns.lock().push(pattern);
    }

    /// Pure matching pass over the registered patterns.
    pub fn matches(&self, def: &NodeDefinition, is_first: bool) -> bool {
        matches_any(&self.patterns.lock(), def, is_first)
    }

    pub fn clear(&self) {
        self.patterns.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.patterns.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.lock().is_empty()
    }
}

/// Block/resume mechanics for interactive debugging.
///
/// The channel's debugger advice only decides *which* node id should
/// suspend and informs the debugger; suspending the traversal and waiting
/// for an external resume is entirely the debugger's business.
#[async_trait]
pub trait Debugger: Send + Sync {
    /// Install a breakpoint on a node id.
    fn add_breakpoint(&self, node_id: &str);

    fn remove_breakpoint(&self, node_id: &str);

    /// Whether single-step sessions should break on the route input
    /// pseudo-node instead of the first real node.
    fn single_step_include_start_end(&self) -> bool {
        false
    }

    /// Called before the node runs; resolves once the debugger releases
    /// the exchange (immediately when the node id has no breakpoint).
    async fn before_process(&self, exchange: &mut Exchange, def: &NodeDefinition) -> Result<()>;

    /// Called after the node ran with the time it took.
    async fn after_process(
        &self,
        exchange: &mut Exchange,
        def: &NodeDefinition,
        elapsed_ms: u64,
    ) -> Result<()>;
}
