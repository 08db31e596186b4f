//! Immutable route and node metadata.
//!
//! Definitions are created when a route is built and never mutated at
//! runtime; every exchange passing a node shares the same definition.

use serde::{Deserialize, Serialize};

/// Identifies one route step for correlation in traces, history and
/// breakpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeDefinition {
    /// Unique node id within the route.
    pub id: String,
    /// Short kind name, e.g. `"transform"` or `"filter"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    /// Source location, optionally schemed (`"file:orders.yaml"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Line number within the source location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl NodeDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            short_name: None,
            location: None,
            line: None,
        }
    }

    pub fn with_short_name(mut self, short_name: impl Into<String>) -> Self {
        self.short_name = Some(short_name.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>, line: u32) -> Self {
        self.location = Some(location.into());
        self.line = Some(line);
        self
    }

    /// Location with any scheme prefix removed (`"file:orders.yaml"` becomes
    /// `"orders.yaml"`).
    pub fn stripped_location(&self) -> Option<&str> {
        let location = self.location.as_deref()?;
        match location.split_once(':') {
            Some((_, rest)) => Some(rest),
            None => Some(location),
        }
    }

    /// Human readable name for logs: the short name when present, else the
    /// id.
    pub fn label(&self) -> &str {
        self.short_name.as_deref().unwrap_or(&self.id)
    }
}

/// Immutable description of one route: its input pseudo-node and the
/// ordered list of processing nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDefinition {
    pub id: String,
    /// Pseudo-node standing for the route input, used when breakpoints or
    /// history should attach before the first real node.
    pub input: NodeDefinition,
    pub nodes: Vec<NodeDefinition>,
    /// Routes stamped out from a template are facades and are skipped by
    /// the debugger.
    #[serde(default)]
    pub created_from_template: bool,
    /// Same for the thin routes generated by REST contract binding.
    #[serde(default)]
    pub created_from_rest: bool,
}

impl RouteDefinition {
    pub fn new(id: impl Into<String>, nodes: Vec<NodeDefinition>) -> Self {
        let id = id.into();
        let input = NodeDefinition::new(format!("{id}-input")).with_short_name("from");
        Self {
            id,
            input,
            nodes,
            created_from_template: false,
            created_from_rest: false,
        }
    }

    /// Whether the debugger may attach to this route at all.
    pub fn debuggable(&self) -> bool {
        !self.created_from_template && !self.created_from_rest
    }
}
