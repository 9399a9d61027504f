//! Service reconciliation and strategy refresh.

use crate::balancer::core::StateCore;
use crate::balancer::subscriber::{self, ListenCallback, PropertyKind, SubscriberCore};
use crate::discovery::{PropertyEventBus, PropertyEventSubscriber};
use crate::properties::ServiceProperties;
use crate::strategy::{LoadBalancerStrategy, StrategyFactory};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

pub(crate) struct ServiceSubscriber {
    core: SubscriberCore,
    state: Arc<StateCore>,
    bus: PropertyEventBus<ServiceProperties>,
}

impl ServiceSubscriber {
    pub(crate) fn new(state: Arc<StateCore>, bus: PropertyEventBus<ServiceProperties>) -> Self {
        Self {
            core: SubscriberCore::new(PropertyKind::Service),
            state,
            bus,
        }
    }

    pub(crate) fn ensure_listening(self: &Arc<Self>, name: &str, callback: ListenCallback) {
        subscriber::ensure_listening(self, &self.core, &self.bus, name, callback);
    }

    pub(crate) fn listen_count(&self) -> usize {
        self.core.listen_count()
    }

    pub(crate) fn is_listening(&self, name: &str) -> bool {
        self.core.is_listening(name)
    }

    fn handle_put(&self, service_name: &str, properties: Option<&ServiceProperties>) {
        let old_item = self
            .state
            .service_properties
            .get(service_name)
            .map(|entry| entry.value().clone());

        let item = self
            .state
            .new_item(properties.map(|p| Arc::new(p.clone())));
        self.state
            .service_properties
            .insert(service_name.to_string(), item);

        match properties {
            Some(properties) => {
                // The strategy name or the cluster may have changed.
                self.state.refresh_service_strategies(properties);

                self.state
                    .services_per_cluster
                    .entry(properties.cluster_name().to_string())
                    .or_default()
                    .insert(properties.service_name().to_string());
            }
            None => {
                info!(service = service_name, "service properties known-absent");
                // The service left its cluster; unhook the reverse index.
                if let Some(old_properties) = old_item.and_then(|item| item.shared_value()) {
                    if let Some(mut services) = self
                        .state
                        .services_per_cluster
                        .get_mut(old_properties.cluster_name())
                    {
                        services.remove(old_properties.service_name());
                    }
                }
            }
        }
    }

    fn handle_remove(&self, service_name: &str) {
        if let Some((_, item)) = self.state.service_properties.remove(service_name) {
            if let Some(properties) = item.shared_value() {
                if let Some(mut services) = self
                    .state
                    .services_per_cluster
                    .get_mut(properties.cluster_name())
                {
                    services.remove(properties.service_name());
                }
            }
        }
    }
}

impl PropertyEventSubscriber<ServiceProperties> for ServiceSubscriber {
    fn on_initialize(&self, name: &str, value: Option<&ServiceProperties>) {
        trace!(service = name, "service subscriber: initialize");
        self.handle_put(name, value);
        self.core.complete_initialization(name);
    }

    fn on_add(&self, name: &str, value: Option<&ServiceProperties>) {
        trace!(service = name, "service subscriber: update");
        self.handle_put(name, value);
    }

    fn on_remove(&self, name: &str) {
        trace!(service = name, "service subscriber: remove");
        self.handle_remove(name);
    }
}

impl StateCore {
    /// Rebuild the (scheme -> strategy) map for a service and notify
    /// listeners of the replacement.
    ///
    /// Called on every service event and again for each service of a
    /// cluster whose properties are republished. Removal notifications
    /// for the old map are delivered before any addition for the new one,
    /// so listeners keyed on (service, scheme) never unhook what was just
    /// added.
    pub(crate) fn refresh_service_strategies(&self, service_properties: &ServiceProperties) {
        let service_name = service_properties.service_name();
        info!(service = service_name, "refreshing service strategies");

        // First factory in the prioritized list that is registered wins;
        // the legacy single-name field is only consulted when the list is
        // empty.
        let mut factory: Option<&Arc<dyn StrategyFactory>> = None;
        if !service_properties.strategy_list().is_empty() {
            for strategy_name in service_properties.strategy_list() {
                if let Some(found) = self.strategy_factories.get(strategy_name) {
                    factory = Some(found);
                    break;
                }
            }
        } else if let Some(legacy) = service_properties.strategy_name() {
            factory = self.strategy_factories.get(legacy);
        }
        if factory.is_none() {
            // Can happen while services are still being published; the
            // map stays empty until a later refresh resolves a factory.
            warn!(
                service = service_name,
                "no resolvable load balancer strategy"
            );
        }

        let cluster_info = self
            .cluster_info
            .get(service_properties.cluster_name())
            .map(|entry| entry.value().clone());

        let mut new_strategies: HashMap<String, Arc<dyn LoadBalancerStrategy>> = HashMap::new();
        match (cluster_info, factory) {
            (Some(cluster_info), Some(factory)) => {
                match cluster_info.properties_item().value() {
                    Some(cluster_properties) => {
                        for scheme in cluster_properties.prioritized_schemes() {
                            // Each strategy gets its own copy of the
                            // properties map, so later mutations cannot
                            // alias.
                            let properties_copy =
                                service_properties.strategy_properties().clone();
                            let strategy =
                                factory.new_strategy(service_name, properties_copy);
                            new_strategies.insert(scheme.clone(), strategy);
                        }
                    }
                    None => {
                        debug!(
                            service = service_name,
                            cluster = service_properties.cluster_name(),
                            "cluster properties known-absent, no strategies built"
                        );
                    }
                }
            }
            _ => {
                warn!(
                    service = service_name,
                    cluster = service_properties.cluster_name(),
                    "unable to find cluster or strategy factory"
                );
            }
        }
        let new_strategies = Arc::new(new_strategies);

        let old_strategies = self
            .service_strategies
            .insert(service_name.to_string(), Arc::clone(&new_strategies));
        self.strategies_cache.remove(service_name);

        if let Some(old_strategies) = old_strategies {
            for (scheme, strategy) in old_strategies.iter() {
                self.notify_strategy_removed(service_name, scheme, strategy);
            }
        }
        if !new_strategies.is_empty() {
            for (scheme, strategy) in new_strategies.iter() {
                self.notify_strategy_added(service_name, scheme, strategy);
            }
        }
    }
}
