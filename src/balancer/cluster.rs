//! Cluster reconciliation: transport-client lifecycle and the cross-index
//! fanout.
//!
//! A cluster event is the widest-reaching input the engine handles. It
//! rebuilds the cluster's transport clients, rebuilds its tracker clients
//! against them, retires the replaced transport clients asynchronously,
//! and refreshes the strategies of every service on the cluster because
//! the scheme set may have changed.

use crate::balancer::core::StateCore;
use crate::balancer::item::ClusterInfo;
use crate::balancer::subscriber::{self, ListenCallback, PropertyKind, SubscriberCore};
use crate::discovery::{PropertyEventBus, PropertyEventSubscriber};
use crate::properties::{accessor_for, ClusterProperties};
use crate::transport::TransportClient;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

pub(crate) struct ClusterSubscriber {
    core: SubscriberCore,
    state: Arc<StateCore>,
    bus: PropertyEventBus<ClusterProperties>,
}

impl ClusterSubscriber {
    pub(crate) fn new(state: Arc<StateCore>, bus: PropertyEventBus<ClusterProperties>) -> Self {
        Self {
            core: SubscriberCore::new(PropertyKind::Cluster),
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

    fn handle_put(&self, cluster_name: &str, properties: Option<&ClusterProperties>) {
        let Some(properties) = properties else {
            // Known-absent sentinel: downstream lookups see the cluster
            // but find no value. Nothing is rebuilt.
            let version = self.state.next_version();
            self.state
                .cluster_info
                .insert(cluster_name.to_string(), ClusterInfo::new(None, None, version));
            return;
        };

        // Derive the partition accessor alongside the stored properties.
        let accessor = match accessor_for(properties.partition_properties()) {
            Ok(accessor) => Some(accessor),
            Err(error) => {
                warn!(
                    cluster = cluster_name,
                    error = %error,
                    "failed to derive partition accessor"
                );
                None
            }
        };
        let version = self.state.next_version();
        self.state.cluster_info.insert(
            cluster_name.to_string(),
            ClusterInfo::new(Some(Arc::new(properties.clone())), accessor, version),
        );

        // One transport client per prioritized scheme with a registered
        // factory. The map is frozen before publication.
        let mut new_clients: HashMap<String, Arc<dyn TransportClient>> = HashMap::new();
        for scheme in properties.prioritized_schemes() {
            match self.state.client_factories.get(scheme) {
                Some(factory) => {
                    let client = factory.new_client(properties.properties());
                    new_clients.insert(scheme.to_lowercase(), client);
                }
                None => {
                    warn!(
                        cluster = cluster_name,
                        scheme = %scheme,
                        "no transport client factory for scheme"
                    );
                }
            }
        }
        let new_clients = Arc::new(new_clients);

        // Publish the new client map before building trackers, so
        // build_tracker resolves against it. The replaced map is captured
        // for retirement.
        let old_clients = self
            .state
            .cluster_clients
            .insert(cluster_name.to_string(), new_clients);

        // Rebuild the tracker map from the current endpoint set.
        let new_trackers = Arc::new(DashMap::new());
        let uri_properties = self
            .state
            .uri_properties
            .get(cluster_name)
            .and_then(|item| item.value().shared_value());
        if let Some(uri_properties) = uri_properties {
            for uri in uri_properties.uris() {
                let partition_data = uri_properties
                    .partition_data(uri)
                    .cloned()
                    .unwrap_or_default();
                if let Some(tracker) =
                    self.state.build_tracker(cluster_name, uri, partition_data)
                {
                    new_trackers.insert(uri.clone(), tracker);
                }
            }
        } else {
            debug!(
                cluster = cluster_name,
                "no uri properties yet, tracker map starts empty"
            );
        }
        // The replaced tracker map needs no shutdown; trackers only point
        // at transport clients.
        self.state
            .tracker_clients
            .insert(cluster_name.to_string(), new_trackers);

        // Retire the replaced transport clients asynchronously. In-flight
        // requests complete; new requests go through the new map.
        if let Some(old_clients) = old_clients {
            for (scheme, client) in old_clients.iter() {
                let cluster = cluster_name.to_string();
                let scheme = scheme.clone();
                client.shutdown(Box::new(move |result| match result {
                    Ok(()) => info!(
                        cluster = %cluster,
                        scheme = %scheme,
                        "shut down replaced transport client"
                    ),
                    Err(error) => warn!(
                        cluster = %cluster,
                        scheme = %scheme,
                        error = %error,
                        "failed to shut down replaced transport client"
                    ),
                }));
            }
        }

        // The scheme set may have changed; refresh every service on this
        // cluster.
        let services = self
            .state
            .services_per_cluster
            .get(cluster_name)
            .map(|entry| entry.value().clone());
        if let Some(services) = services {
            for service_name in services {
                let service_properties = self
                    .state
                    .service_properties
                    .get(&service_name)
                    .and_then(|item| item.value().shared_value());
                if let Some(service_properties) = service_properties {
                    self.state.refresh_service_strategies(&service_properties);
                }
            }
        }
    }

    fn handle_remove(&self, cluster_name: &str) {
        // Only the index entry goes away. Transport clients and trackers
        // are retired by the companion endpoint-removal event; see the
        // lifecycle test covering this.
        self.state.cluster_info.remove(cluster_name);
    }
}

impl PropertyEventSubscriber<ClusterProperties> for ClusterSubscriber {
    fn on_initialize(&self, name: &str, value: Option<&ClusterProperties>) {
        trace!(cluster = name, "cluster subscriber: initialize");
        self.handle_put(name, value);
        self.core.complete_initialization(name);
    }

    fn on_add(&self, name: &str, value: Option<&ClusterProperties>) {
        trace!(cluster = name, "cluster subscriber: update");
        self.handle_put(name, value);
    }

    fn on_remove(&self, name: &str) {
        trace!(cluster = name, "cluster subscriber: remove");
        self.handle_remove(name);
    }
}
