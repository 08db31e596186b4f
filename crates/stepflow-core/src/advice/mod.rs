//! Built-in advices the channel registers around each node.

mod debugger;
mod delayer;
mod history;
mod stream_caching;
mod trace;

pub use debugger::DebuggerAdvice;
pub use delayer::DelayerAdvice;
pub use history::{MessageHistoryAdvice, NodeHistoryAdvice};
pub use stream_caching::StreamCachingAdvice;
pub use trace::{BacklogTracerAdvice, TracingAdvice};
