//! Route assembly and the per-exchange dispatcher.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use stepflow_model::{CurrentNode, Exchange, FlowError, NodeDefinition, Result, RouteDefinition};
use stepflow_traits::{ErrorHandlerFactory, InterceptStrategy, Processor, SharedProcessor};

use crate::channel::Channel;
use crate::context::EngineContext;
use crate::lifecycle::ServiceLifecycle;

/// Per-route toggles that parameterize channel construction.
///
/// Standby machinery is a context concern; these flags say what this
/// route itself asked for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteSettings {
    pub tracing: bool,
    pub backlog_tracing: bool,
    pub debugging: bool,
    pub message_history: bool,
    /// Route-level override of the engine-wide stream caching default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_caching: Option<bool>,
    /// Pause inserted ahead of every node; absent or zero disables it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<Duration>,
}

struct NodeSpec {
    def: Arc<NodeDefinition>,
    child: Option<Arc<NodeDefinition>>,
    processor: SharedProcessor,
}

/// Collects the pieces of a route before any channel exists.
pub struct RouteBuilder {
    context: Arc<EngineContext>,
    id: String,
    settings: RouteSettings,
    specs: Vec<NodeSpec>,
    interceptors: Vec<Arc<dyn InterceptStrategy>>,
    error_handler_factory: Option<Arc<dyn ErrorHandlerFactory>>,
    created_from_template: bool,
    created_from_rest: bool,
}

impl RouteBuilder {
    pub fn new(context: Arc<EngineContext>, id: impl Into<String>) -> Self {
        Self {
            context,
            id: id.into(),
            settings: RouteSettings::default(),
            specs: Vec::new(),
            interceptors: Vec::new(),
            error_handler_factory: None,
            created_from_template: false,
            created_from_rest: false,
        }
    }

    pub fn with_settings(mut self, settings: RouteSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Append a node and the processor that does its real work.
    pub fn node(mut self, def: NodeDefinition, processor: SharedProcessor) -> Self {
        self.specs.push(NodeSpec {
            def: Arc::new(def),
            child: None,
            processor,
        });
        self
    }

    /// Append a node whose definition expands to a finer-grained child;
    /// correlation uses the child.
    pub fn node_with_child(
        mut self,
        def: NodeDefinition,
        child: NodeDefinition,
        processor: SharedProcessor,
    ) -> Self {
        self.specs.push(NodeSpec {
            def: Arc::new(def),
            child: Some(Arc::new(child)),
            processor,
        });
        self
    }

    pub fn with_interceptor(mut self, strategy: Arc<dyn InterceptStrategy>) -> Self {
        self.interceptors.push(strategy);
        self
    }

    pub fn with_error_handler_factory(mut self, factory: Arc<dyn ErrorHandlerFactory>) -> Self {
        self.error_handler_factory = Some(factory);
        self
    }

    pub fn created_from_template(mut self) -> Self {
        self.created_from_template = true;
        self
    }

    pub fn created_from_rest(mut self) -> Self {
        self.created_from_rest = true;
        self
    }

    pub fn build(self) -> Route {
        let nodes = self
            .specs
            .iter()
            .map(|spec| (*spec.def).clone())
            .collect();
        let mut definition = RouteDefinition::new(self.id, nodes);
        definition.created_from_template = self.created_from_template;
        definition.created_from_rest = self.created_from_rest;
        Route {
            context: self.context,
            definition,
            settings: self.settings,
            specs: self.specs,
            interceptors: self.interceptors,
            error_handler_factory: self.error_handler_factory,
            channels: Mutex::new(Vec::new()),
            shutdown_signal: Mutex::new(CancellationToken::new()),
            lifecycle: ServiceLifecycle::new(),
        }
    }
}

/// A started route owns one channel per node and walks exchanges through
/// them in order.
///
/// Restarting rebuilds every channel from the retained specs; channels
/// from a previous start are never reused.
pub struct Route {
    context: Arc<EngineContext>,
    definition: RouteDefinition,
    settings: RouteSettings,
    specs: Vec<NodeSpec>,
    interceptors: Vec<Arc<dyn InterceptStrategy>>,
    error_handler_factory: Option<Arc<dyn ErrorHandlerFactory>>,
    channels: Mutex<Vec<Arc<Channel>>>,
    shutdown_signal: Mutex<CancellationToken>,
    lifecycle: ServiceLifecycle,
}

impl Route {
    pub fn definition(&self) -> &RouteDefinition {
        &self.definition
    }

    pub fn settings(&self) -> &RouteSettings {
        &self.settings
    }

    pub fn is_started(&self) -> bool {
        self.lifecycle.is_started()
    }

    /// Snapshot of the current channels, one per node, route order.
    pub fn channels(&self) -> Vec<Arc<Channel>> {
        self.channels.lock().clone()
    }

    /// Build and start a fresh channel per node. Nothing is swapped in
    /// until every channel built and started, so a failed start leaves no
    /// partially built route behind; channels started before the failure
    /// are stopped again.
    pub async fn start(&self) -> Result<()> {
        if !self.lifecycle.to_started()? {
            return Ok(());
        }
        match self.build_and_start().await {
            Ok(()) => Ok(()),
            Err(error) => {
                self.lifecycle.to_stopped();
                Err(error)
            }
        }
    }

    async fn build_and_start(&self) -> Result<()> {
        if self.specs.is_empty() {
            return Err(FlowError::configuration(format!(
                "route {} has no nodes",
                self.definition.id
            )));
        }
        // A cancelled token stays cancelled, so every start gets its own.
        let shutdown = CancellationToken::new();
        let channels = self.build_channels(&shutdown)?;
        for (index, channel) in channels.iter().enumerate() {
            if let Err(error) = channel.start().await {
                // Channels started before the failure still get their
                // paired stop, newest first.
                for started in channels[..index].iter().rev() {
                    if let Err(stop_error) = started.stop().await {
                        warn!(
                            route_id = %self.definition.id,
                            error = %stop_error,
                            "channel stop failed while unwinding a failed start"
                        );
                    }
                }
                return Err(error);
            }
        }
        *self.shutdown_signal.lock() = shutdown;
        *self.channels.lock() = channels;
        info!(
            route_id = %self.definition.id,
            nodes = self.specs.len(),
            "route started"
        );
        Ok(())
    }

    fn build_channels(&self, shutdown: &CancellationToken) -> Result<Vec<Arc<Channel>>> {
        let mut channels = Vec::with_capacity(self.specs.len());
        for (index, spec) in self.specs.iter().enumerate() {
            let mut channel = Channel::new(self.context.clone());
            channel.init(
                &self.settings,
                shutdown,
                &spec.def,
                spec.child.as_ref(),
                &self.interceptors,
                spec.processor.clone(),
                &self.definition,
                index == 0,
            )?;
            if let Some(factory) = &self.error_handler_factory {
                let chain = channel.output().ok_or_else(|| {
                    FlowError::configuration("channel has no output after init")
                })?;
                channel.set_error_handler(factory.create(chain)?);
            }
            channel.post_init()?;
            channels.push(Arc::new(channel));
        }
        Ok(channels)
    }

    /// Walk the exchange through the channels in route order.
    ///
    /// Stops early when a node flags stop-routing or leaves the exchange
    /// failed with no error handler to clear it. Completion callbacks run
    /// exactly once on every path out.
    pub async fn process(&self, exchange: &mut Exchange) -> Result<()> {
        if !self.lifecycle.is_started() {
            return Err(FlowError::lifecycle(format!(
                "route {} is not started",
                self.definition.id
            )));
        }
        let channels = self.channels();

        // The exchange enters at the route input pseudo-node; the first
        // node's history advice reads it as the parent.
        exchange.set_current_node(CurrentNode {
            route_id: self.definition.id.clone(),
            node_id: self.definition.input.id.clone(),
            label: self.definition.input.label().to_string(),
            source: None,
        });

        let mut result = Ok(());
        for channel in &channels {
            if exchange.is_stop_routing() || exchange.is_failed() {
                break;
            }
            if let Err(error) = channel.process(exchange).await {
                result = Err(error);
                break;
            }
        }
        exchange.complete();
        result
    }

    /// Cancel in-flight delays and stop the channels, newest first.
    pub async fn stop(&self) -> Result<()> {
        if !self.lifecycle.to_stopped() {
            return Ok(());
        }
        self.shutdown_signal.lock().cancel();
        let channels = self.channels();
        for channel in channels.iter().rev() {
            channel.stop().await?;
        }
        debug!(route_id = %self.definition.id, "route stopped");
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        if !self.lifecycle.to_shutdown() {
            return Ok(());
        }
        self.shutdown_signal.lock().cancel();
        let channels = std::mem::take(&mut *self.channels.lock());
        for channel in channels.iter().rev() {
            channel.shutdown().await?;
        }
        debug!(route_id = %self.definition.id, "route shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use stepflow_traits::ErrorHandler;

    struct CountingTarget {
        hits: AtomicUsize,
    }

    impl CountingTarget {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                hits: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Processor for CountingTarget {
        async fn process(&self, _exchange: &mut Exchange) -> Result<()> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct LifecycleTarget {
        fail_start: bool,
        started: AtomicBool,
        stopped: AtomicBool,
    }

    impl LifecycleTarget {
        fn new(fail_start: bool) -> Arc<Self> {
            Arc::new(Self {
                fail_start,
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl Processor for LifecycleTarget {
        async fn process(&self, _exchange: &mut Exchange) -> Result<()> {
            Ok(())
        }

        async fn start(&self) -> Result<()> {
            if self.fail_start {
                return Err(FlowError::configuration("start refused"));
            }
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingFactory;

    impl ErrorHandlerFactory for FailingFactory {
        fn create(&self, _output: SharedProcessor) -> Result<Arc<dyn ErrorHandler>> {
            Err(FlowError::configuration("no handler for you"))
        }
    }

    fn two_node_route() -> (Route, Arc<CountingTarget>, Arc<CountingTarget>) {
        let first = CountingTarget::new();
        let second = CountingTarget::new();
        let route = RouteBuilder::new(Arc::new(EngineContext::new()), "orders")
            .node(NodeDefinition::new("n1"), first.clone())
            .node(NodeDefinition::new("n2"), second.clone())
            .build();
        (route, first, second)
    }

    #[tokio::test]
    async fn walks_every_node_in_order() {
        let (route, first, second) = two_node_route();
        route.start().await.unwrap();

        let mut exchange = Exchange::new();
        route.process(&mut exchange).await.unwrap();

        assert_eq!(first.hits.load(Ordering::SeqCst), 1);
        assert_eq!(second.hits.load(Ordering::SeqCst), 1);
        assert!(exchange.is_completed());
        assert_eq!(exchange.current_node().unwrap().node_id, "n2");
    }

    #[tokio::test]
    async fn restart_rebuilds_fresh_channels() {
        let (route, _, _) = two_node_route();
        route.start().await.unwrap();
        let before = route.channels();
        assert_eq!(before.len(), 2);

        route.stop().await.unwrap();
        route.start().await.unwrap();
        let after = route.channels();

        assert_eq!(after.len(), 2);
        for (old, new) in before.iter().zip(&after) {
            assert!(!Arc::ptr_eq(old, new));
        }
    }

    #[tokio::test]
    async fn failed_start_leaves_nothing_runnable() {
        let target = CountingTarget::new();
        let route = RouteBuilder::new(Arc::new(EngineContext::new()), "orders")
            .node(NodeDefinition::new("n1"), target.clone())
            .with_error_handler_factory(Arc::new(FailingFactory))
            .build();

        assert!(route.start().await.is_err());
        assert!(!route.is_started());
        assert!(route.channels().is_empty());
        assert!(route.process(&mut Exchange::new()).await.is_err());
        assert_eq!(target.hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn start_failure_stops_the_channels_already_started() {
        let first = LifecycleTarget::new(false);
        let second = LifecycleTarget::new(true);
        let route = RouteBuilder::new(Arc::new(EngineContext::new()), "orders")
            .node(NodeDefinition::new("n1"), first.clone())
            .node(NodeDefinition::new("n2"), second.clone())
            .build();

        assert!(route.start().await.is_err());
        assert!(first.started.load(Ordering::SeqCst));
        assert!(first.stopped.load(Ordering::SeqCst));
        assert!(!second.started.load(Ordering::SeqCst));
        assert!(!route.is_started());
        assert!(route.channels().is_empty());
    }

    #[tokio::test]
    async fn empty_route_fails_to_start() {
        let route = RouteBuilder::new(Arc::new(EngineContext::new()), "empty").build();
        assert!(route.start().await.is_err());
    }

    #[tokio::test]
    async fn stop_cuts_an_inflight_delay_short() {
        let target = CountingTarget::new();
        let settings = RouteSettings {
            delay: Some(Duration::from_secs(60)),
            ..Default::default()
        };
        let route = Arc::new(
            RouteBuilder::new(Arc::new(EngineContext::new()), "orders")
                .with_settings(settings)
                .node(NodeDefinition::new("n1"), target.clone())
                .build(),
        );
        route.start().await.unwrap();

        let inflight = {
            let route = route.clone();
            tokio::spawn(async move {
                let mut exchange = Exchange::new();
                route.process(&mut exchange).await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        route.stop().await.unwrap();

        // The delay resolves on cancellation and the exchange drains.
        tokio::time::timeout(Duration::from_secs(5), inflight)
            .await
            .expect("exchange still delayed after stop")
            .unwrap()
            .unwrap();
        assert_eq!(target.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_routing_skips_the_remaining_nodes() {
        struct StopTarget;

        #[async_trait]
        impl Processor for StopTarget {
            async fn process(&self, exchange: &mut Exchange) -> Result<()> {
                exchange.set_stop_routing(true);
                Ok(())
            }
        }

        let second = CountingTarget::new();
        let route = RouteBuilder::new(Arc::new(EngineContext::new()), "orders")
            .node(NodeDefinition::new("n1"), Arc::new(StopTarget))
            .node(NodeDefinition::new("n2"), second.clone())
            .build();
        route.start().await.unwrap();

        let mut exchange = Exchange::new();
        route.process(&mut exchange).await.unwrap();

        assert_eq!(second.hits.load(Ordering::SeqCst), 0);
        assert!(exchange.is_completed());
    }

    #[test]
    fn settings_fill_defaults_for_missing_fields() {
        let settings: RouteSettings =
            serde_json::from_value(serde_json::json!({ "tracing": true })).unwrap();

        assert!(settings.tracing);
        assert!(!settings.backlog_tracing);
        assert!(!settings.debugging);
        assert!(!settings.message_history);
        assert_eq!(settings.stream_caching, None);
        assert_eq!(settings.delay, None);
    }

    #[test]
    fn unset_overrides_stay_out_of_serialized_settings() {
        let value = serde_json::to_value(RouteSettings::default()).unwrap();
        let object = value.as_object().unwrap();

        assert!(object.contains_key("tracing"));
        assert!(!object.contains_key("stream_caching"));
        assert!(!object.contains_key("delay"));
    }
}
