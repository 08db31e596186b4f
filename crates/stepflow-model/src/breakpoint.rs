//! Breakpoint patterns, parsed once at registration time.
//!
//! A raw pattern string is classified into a tagged variant when it is
//! registered; traversal-time matching works on the pre-parsed form and is
//! a pure function of the node definition and the first-node flag.

use glob_match::glob_match;
use thiserror::Error;

use crate::definition::NodeDefinition;

/// Reserved pattern that matches only the first node of a route.
pub const FIRST_NODE_SENTINEL: &str = "_first_node_";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BreakpointParseError {
    #[error("empty breakpoint pattern")]
    Empty,
    #[error("breakpoint pattern {0:?} has a line number but no location")]
    MissingLocation(String),
}

/// A single pre-parsed breakpoint pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointPattern {
    /// Exact or wildcard match on the node id.
    ById(String),
    /// Exact or wildcard match on the node short name.
    ByShortName(String),
    /// Scheme-stripped location match plus numeric line match.
    ByLocationLine { location: String, line: u32 },
    /// Line match irrespective of location.
    ByLine(u32),
    /// Matches only when the traversal is the route's first node.
    FirstNode,
}

impl BreakpointPattern {
    /// Classify one raw pattern.
    ///
    /// A plain name cannot be told apart from a short name at parse time,
    /// so it expands to both variants; everything else parses to exactly
    /// one.
    pub fn parse(pattern: &str) -> Result<Vec<Self>, BreakpointParseError> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(BreakpointParseError::Empty);
        }
        if pattern == FIRST_NODE_SENTINEL {
            return Ok(vec![Self::FirstNode]);
        }
        if let Ok(line) = pattern.parse::<u32>() {
            return Ok(vec![Self::ByLine(line)]);
        }
        if let Some((location, tail)) = pattern.rsplit_once(':') {
            if let Ok(line) = tail.parse::<u32>() {
                if location.is_empty() {
                    return Err(BreakpointParseError::MissingLocation(pattern.to_string()));
                }
                return Ok(vec![Self::ByLocationLine {
                    location: location.to_string(),
                    line,
                }]);
            }
        }
        Ok(vec![
            Self::ById(pattern.to_string()),
            Self::ByShortName(pattern.to_string()),
        ])
    }

    /// Parse a comma separated pattern list, skipping blank entries.
    pub fn parse_list(patterns: &str) -> Result<Vec<Self>, BreakpointParseError> {
        let mut parsed = Vec::new();
        for part in patterns.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            parsed.extend(Self::parse(part)?);
        }
        Ok(parsed)
    }

    /// Whether this pattern selects `def`. Pure; installing a breakpoint on
    /// a match is the caller's separate step.
    pub fn matches(&self, def: &NodeDefinition, is_first: bool) -> bool {
        match self {
            Self::ById(pattern) => glob_match(pattern, &def.id),
            Self::ByShortName(pattern) => def
                .short_name
                .as_deref()
                .is_some_and(|name| glob_match(pattern, name)),
            Self::ByLocationLine { location, line } => {
                def.line == Some(*line)
                    && def
                        .stripped_location()
                        .is_some_and(|loc| glob_match(location, loc))
            }
            Self::ByLine(line) => def.line == Some(*line),
            Self::FirstNode => is_first,
        }
    }
}

/// OR across a pattern list; the first match wins.
pub fn matches_any(patterns: &[BreakpointPattern], def: &NodeDefinition, is_first: bool) -> bool {
    patterns.iter().any(|p| p.matches(def, is_first))
}
