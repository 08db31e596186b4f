//! Stepflow Core - channel composition engine.
//!
//! Builds one [`Channel`] per route node, wiring the node's processor
//! with advices, interceptors and the error handler, and dispatches
//! exchanges through the started channels.

pub mod advice;
pub mod backlog;
pub mod channel;
pub mod context;
pub mod error_handler;
pub mod history;
pub mod instrument;
mod intercept;
pub mod lifecycle;
pub mod pipeline;
pub mod route;

pub use backlog::{InMemoryBacklogTracer, DEFAULT_BACKLOG_CAPACITY};
pub use channel::Channel;
pub use context::EngineContext;
pub use error_handler::{DefaultErrorHandler, DefaultErrorHandlerFactory};
pub use history::DefaultMessageHistoryFactory;
pub use instrument::InstrumentationProcessor;
pub use lifecycle::{ServiceLifecycle, ServiceState};
pub use pipeline::AdvicePipeline;
pub use route::{Route, RouteBuilder, RouteSettings};

pub use stepflow_traits::BreakpointRegistry;
