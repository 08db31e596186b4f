//! Data model for the stepflow routing engine.
//!
//! Everything an exchange carries while it moves through a route lives
//! here: the message and its body forms, the immutable node and route
//! definitions used for correlation, history records, and the pre-parsed
//! breakpoint patterns with their pure matcher. The engine crates build on
//! these types but this crate knows nothing about channels or advices.

pub mod breakpoint;
pub mod definition;
pub mod error;
pub mod exchange;
pub mod history;
pub mod message;
pub mod stream_cache;

// Common types at the crate root
pub use breakpoint::{BreakpointParseError, BreakpointPattern, FIRST_NODE_SENTINEL};
pub use definition::{NodeDefinition, RouteDefinition};
pub use error::{FlowError, Result};
pub use exchange::{Exchange, OnCompletion};
pub use history::{BacklogTraceEvent, CurrentNode, MessageHistory};
pub use message::{Body, BodyStream, Message};
pub use stream_cache::{StreamCache, StreamCachingConfig};
