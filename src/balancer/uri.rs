//! URI reconciliation: endpoint churn drives tracker-client lifecycle.

use crate::balancer::core::StateCore;
use crate::balancer::subscriber::{self, ListenCallback, PropertyKind, SubscriberCore};
use crate::discovery::{PropertyEventBus, PropertyEventSubscriber};
use crate::properties::UriProperties;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, trace, warn};
use url::Url;

/// Applies endpoint-set events to the engine state.
///
/// New URIs get tracker clients built against the cluster's current
/// transport clients; URIs that disappear get their trackers dropped.
/// Tracker clients hold no resources, so removal never shuts a transport
/// client down.
pub(crate) struct UriSubscriber {
    core: SubscriberCore,
    state: Arc<StateCore>,
    bus: PropertyEventBus<UriProperties>,
}

impl UriSubscriber {
    pub(crate) fn new(state: Arc<StateCore>, bus: PropertyEventBus<UriProperties>) -> Self {
        Self {
            core: SubscriberCore::new(PropertyKind::Uri),
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

    fn handle_put(&self, cluster_name: &str, properties: Option<&UriProperties>) {
        // Add trackers for endpoints we are not yet tracking, before the
        // index is replaced.
        if let Some(properties) = properties {
            let trackers = self
                .state
                .tracker_clients
                .entry(cluster_name.to_string())
                .or_insert_with(|| Arc::new(DashMap::new()))
                .clone();

            for uri in properties.uris() {
                if !trackers.contains_key(uri) {
                    let partition_data =
                        properties.partition_data(uri).cloned().unwrap_or_default();
                    if let Some(client) =
                        self.state.build_tracker(cluster_name, uri, partition_data)
                    {
                        info!(
                            cluster = cluster_name,
                            uri = %uri,
                            "adding tracker client from updated uri properties"
                        );
                        self.state.notify_client_added(cluster_name, &client);
                        trackers.insert(uri.clone(), client);
                    }
                }
            }
        }

        // Replace the URI index entry.
        let item = self
            .state
            .new_item(properties.map(|p| Arc::new(p.clone())));
        self.state
            .uri_properties
            .insert(cluster_name.to_string(), item);

        match properties {
            Some(properties) => {
                // Drop trackers for endpoints no longer announced.
                let trackers = self
                    .state
                    .tracker_clients
                    .get(cluster_name)
                    .map(|entry| Arc::clone(entry.value()));
                if let Some(trackers) = trackers {
                    let stale: Vec<Url> = trackers
                        .iter()
                        .filter(|entry| !properties.contains(entry.key()))
                        .map(|entry| entry.key().clone())
                        .collect();
                    for uri in stale {
                        if let Some((_, client)) = trackers.remove(&uri) {
                            info!(
                                cluster = cluster_name,
                                uri = %uri,
                                "removing dead tracker client"
                            );
                            self.state.notify_client_removed(cluster_name, &client);
                            // The transport client stays; trackers only
                            // point at it.
                        }
                    }
                }
            }
            None => {
                // Known-absent endpoint set: drop the whole tracker map.
                warn!(
                    cluster = cluster_name,
                    "uri properties known-absent, removing all tracker clients"
                );
                if let Some((_, trackers)) = self.state.tracker_clients.remove(cluster_name) {
                    for entry in trackers.iter() {
                        self.state
                            .notify_client_removed(cluster_name, entry.value());
                    }
                }
            }
        }
    }

    fn handle_remove(&self, cluster_name: &str) {
        // Tracker lifecycle is driven by endpoint add/remove events, not
        // by the index entry disappearing.
        self.state.uri_properties.remove(cluster_name);
    }
}

impl PropertyEventSubscriber<UriProperties> for UriSubscriber {
    fn on_initialize(&self, name: &str, value: Option<&UriProperties>) {
        trace!(cluster = name, "uri subscriber: initialize");
        self.handle_put(name, value);
        self.core.complete_initialization(name);
    }

    fn on_add(&self, name: &str, value: Option<&UriProperties>) {
        trace!(cluster = name, "uri subscriber: update");
        self.handle_put(name, value);
    }

    fn on_remove(&self, name: &str) {
        trace!(cluster = name, "uri subscriber: remove");
        self.handle_remove(name);
    }
}
