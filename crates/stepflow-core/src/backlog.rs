//! In-memory bounded backlog store.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use stepflow_model::{BacklogTraceEvent, NodeDefinition, Result};
use stepflow_traits::BacklogTracer;

pub const DEFAULT_BACKLOG_CAPACITY: usize = 1000;

/// Keeps the newest `capacity` trace events in memory; the oldest event
/// is dropped when a new one arrives at the bound.
///
/// `standby` builds it disabled so routes can install the advice up
/// front and switch tracing on later without a restart.
pub struct InMemoryBacklogTracer {
    capacity: usize,
    enabled: AtomicBool,
    uid: AtomicU64,
    events: Mutex<VecDeque<BacklogTraceEvent>>,
}

impl InMemoryBacklogTracer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            enabled: AtomicBool::new(true),
            uid: AtomicU64::new(0),
            events: Mutex::new(VecDeque::new()),
        }
    }

    pub fn standby(capacity: usize) -> Self {
        let tracer = Self::new(capacity);
        tracer.enabled.store(false, Ordering::SeqCst);
        tracer
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for InMemoryBacklogTracer {
    fn default() -> Self {
        Self::new(DEFAULT_BACKLOG_CAPACITY)
    }
}

#[async_trait]
impl BacklogTracer for InMemoryBacklogTracer {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn should_trace(&self, _def: &NodeDefinition) -> bool {
        true
    }

    fn next_uid(&self) -> u64 {
        self.uid.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn trace_event(&self, event: BacklogTraceEvent) -> Result<()> {
        let mut events = self.events.lock();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
        Ok(())
    }

    fn dump(&self) -> Vec<BacklogTraceEvent> {
        self.events.lock().iter().cloned().collect()
    }
}
