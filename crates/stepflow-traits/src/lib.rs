//! Stepflow Traits - Shared interfaces and extension points.
//!
//! This crate provides the contracts the channel engine composes against:
//! - Processor unit-of-work contract and the blocking-processor bridge
//! - Advice before/after hooks with opaque per-invocation tokens
//! - InterceptStrategy wrapping extension point
//! - ErrorHandler abstraction with the redelivery capability hook
//! - Debugger plus the shared breakpoint registry
//! - Tracer, BacklogTracer, MessageHistoryFactory, Instrumentation

pub mod advice;
pub mod debug;
pub mod error_handler;
pub mod intercept;
pub mod observe;
pub mod processor;

// ── Top-level re-exports ─────────────────────────────────────────────

// Shared error type
pub use stepflow_model::{FlowError, Result};

// Unit of work
pub use processor::{BlockingProcessor, Processor, SharedProcessor};

// Advice chain
pub use advice::{Advice, AdviceToken, ORDER_DEFAULT, ORDER_OUTERMOST, ORDER_STREAM_CACHING};

// Interceptors
pub use intercept::{InterceptStrategy, InterceptorOutput};

// Error handling
pub use error_handler::{ErrorHandler, ErrorHandlerFactory, RedeliveryCustomizer};

// Debugging
pub use debug::{BreakpointRegistry, Debugger};

// Observability strategies
pub use observe::{
    BacklogTracer, Instrumentation, InstrumentationFactory, MessageHistoryFactory, Tracer,
};
