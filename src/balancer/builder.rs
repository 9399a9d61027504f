//! Builder for [`BalancerState`].

use crate::balancer::state::BalancerState;
use crate::discovery::{EventLoopHandle, PropertyEventBus};
use crate::properties::{ClusterProperties, ServiceProperties, UriProperties};
use crate::strategy::{RoundRobinStrategyFactory, StrategyFactory, ROUND_ROBIN_STRATEGY_NAME};
use crate::transport::TransportClientFactory;
use std::collections::HashMap;
use std::sync::Arc;

/// Assembles a [`BalancerState`]: factories keyed by scheme and strategy
/// name, plus the three property buses.
///
/// Buses default to fresh ones on the engine's event loop; pass existing
/// buses when a discovery publisher is already attached to them.
pub struct BalancerStateBuilder {
    event_loop: EventLoopHandle,
    client_factories: HashMap<String, Arc<dyn TransportClientFactory>>,
    strategy_factories: HashMap<String, Arc<dyn StrategyFactory>>,
    uri_bus: Option<PropertyEventBus<UriProperties>>,
    cluster_bus: Option<PropertyEventBus<ClusterProperties>>,
    service_bus: Option<PropertyEventBus<ServiceProperties>>,
}

impl BalancerStateBuilder {
    /// Start a builder on the given event loop.
    pub fn new(event_loop: EventLoopHandle) -> Self {
        Self {
            event_loop,
            client_factories: HashMap::new(),
            strategy_factories: HashMap::new(),
            uri_bus: None,
            cluster_bus: None,
            service_bus: None,
        }
    }

    /// Register a transport client factory for a URI scheme.
    pub fn client_factory(
        mut self,
        scheme: impl Into<String>,
        factory: Arc<dyn TransportClientFactory>,
    ) -> Self {
        self.client_factories.insert(scheme.into(), factory);
        self
    }

    /// Register a strategy factory under its lookup name.
    pub fn strategy_factory(
        mut self,
        name: impl Into<String>,
        factory: Arc<dyn StrategyFactory>,
    ) -> Self {
        self.strategy_factories.insert(name.into(), factory);
        self
    }

    /// Register the bundled round-robin strategy under its default name.
    pub fn with_round_robin_strategy(self) -> Self {
        self.strategy_factory(ROUND_ROBIN_STRATEGY_NAME, Arc::new(RoundRobinStrategyFactory))
    }

    /// Use an existing endpoint-set bus.
    pub fn uri_bus(mut self, bus: PropertyEventBus<UriProperties>) -> Self {
        self.uri_bus = Some(bus);
        self
    }

    /// Use an existing cluster configuration bus.
    pub fn cluster_bus(mut self, bus: PropertyEventBus<ClusterProperties>) -> Self {
        self.cluster_bus = Some(bus);
        self
    }

    /// Use an existing service configuration bus.
    pub fn service_bus(mut self, bus: PropertyEventBus<ServiceProperties>) -> Self {
        self.service_bus = Some(bus);
        self
    }

    /// Build the engine.
    pub fn build(self) -> BalancerState {
        let uri_bus = self
            .uri_bus
            .unwrap_or_else(|| PropertyEventBus::new(self.event_loop.clone()));
        let cluster_bus = self
            .cluster_bus
            .unwrap_or_else(|| PropertyEventBus::new(self.event_loop.clone()));
        let service_bus = self
            .service_bus
            .unwrap_or_else(|| PropertyEventBus::new(self.event_loop.clone()));

        BalancerState::new(
            self.event_loop,
            uri_bus,
            cluster_bus,
            service_bus,
            self.client_factories,
            self.strategy_factories,
        )
    }
}
