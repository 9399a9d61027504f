//! Shared state of the reconciliation engine.
//!
//! `StateCore` owns the three property indexes and the derived caches.
//! Concurrency discipline, mirrored everywhere in this module tree:
//!
//! - the factory maps are immutable for the engine's lifetime,
//! - every other map is mutated only from tasks on the event loop,
//! - readers on arbitrary threads go straight at the concurrent maps;
//!   inner scheme-keyed maps are frozen snapshots that are replaced, never
//!   edited, and the per-cluster tracker map is itself concurrent.

use crate::balancer::item::{ClusterInfo, StateItem};
use crate::balancer::listener::BalancerStateListener;
use crate::balancer::tracker::TrackerClient;
use crate::properties::{
    PartitionDataMap, ServiceProperties, UriProperties,
};
use crate::strategy::{LoadBalancerStrategy, SchemeStrategyPair, StrategyFactory};
use crate::transport::{TransportClient, TransportClientFactory};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::warn;
use url::Url;

/// Frozen scheme-to-transport-client snapshot for one cluster.
pub(crate) type SchemeClientMap = Arc<HashMap<String, Arc<dyn TransportClient>>>;

/// Frozen scheme-to-strategy snapshot for one service.
pub(crate) type SchemeStrategyMap = Arc<HashMap<String, Arc<dyn LoadBalancerStrategy>>>;

/// Concurrent per-cluster tracker map, mutated only on the event loop.
pub(crate) type TrackerMap = Arc<DashMap<Url, Arc<TrackerClient>>>;

pub(crate) struct StateCore {
    /// clusterName -> versioned endpoint set.
    pub(crate) uri_properties: DashMap<String, StateItem<UriProperties>>,
    /// clusterName -> versioned cluster properties plus partition accessor.
    pub(crate) cluster_info: DashMap<String, ClusterInfo>,
    /// serviceName -> versioned service properties.
    pub(crate) service_properties: DashMap<String, StateItem<ServiceProperties>>,
    /// clusterName -> names of services currently known to live on it.
    pub(crate) services_per_cluster: DashMap<String, HashSet<String>>,
    /// clusterName -> uri -> tracker client.
    pub(crate) tracker_clients: DashMap<String, TrackerMap>,
    /// clusterName -> lower-cased scheme -> transport client.
    pub(crate) cluster_clients: DashMap<String, SchemeClientMap>,
    /// serviceName -> scheme -> strategy.
    pub(crate) service_strategies: DashMap<String, SchemeStrategyMap>,
    /// Memoized ordered (scheme, strategy) lists, invalidated on refresh.
    pub(crate) strategies_cache: DashMap<String, Arc<Vec<SchemeStrategyPair>>>,
    /// scheme -> transport client factory. Immutable.
    pub(crate) client_factories: HashMap<String, Arc<dyn TransportClientFactory>>,
    /// strategy name -> strategy factory. Immutable.
    pub(crate) strategy_factories: HashMap<String, Arc<dyn StrategyFactory>>,
    /// Observers of derived-state changes. Mutated on the event loop.
    pub(crate) listeners: RwLock<Vec<Arc<dyn BalancerStateListener>>>,
    /// Single monotonic version counter across all property kinds.
    pub(crate) version: AtomicU64,
}

impl StateCore {
    pub(crate) fn new(
        client_factories: HashMap<String, Arc<dyn TransportClientFactory>>,
        strategy_factories: HashMap<String, Arc<dyn StrategyFactory>>,
    ) -> Self {
        Self {
            uri_properties: DashMap::new(),
            cluster_info: DashMap::new(),
            service_properties: DashMap::new(),
            services_per_cluster: DashMap::new(),
            tracker_clients: DashMap::new(),
            cluster_clients: DashMap::new(),
            service_strategies: DashMap::new(),
            strategies_cache: DashMap::new(),
            client_factories,
            strategy_factories,
            listeners: RwLock::new(Vec::new()),
            version: AtomicU64::new(0),
        }
    }

    /// Draw the next version from the shared counter.
    pub(crate) fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Wrap a property value in a freshly versioned item.
    pub(crate) fn new_item<T>(&self, value: Option<Arc<T>>) -> StateItem<T> {
        StateItem::new(value, self.next_version())
    }

    // ------------------------------------------------------------------
    // Derived-object construction
    // ------------------------------------------------------------------

    /// Build a tracker client for `uri` against the cluster's current
    /// transport clients.
    ///
    /// Returns `None`, with a warning, when the cluster has no client map
    /// yet or no client for the URI's scheme.
    pub(crate) fn build_tracker(
        &self,
        cluster_name: &str,
        uri: &Url,
        partition_data: PartitionDataMap,
    ) -> Option<Arc<TrackerClient>> {
        let clients = match self.cluster_clients.get(cluster_name) {
            Some(entry) => Arc::clone(entry.value()),
            None => {
                warn!(
                    cluster = cluster_name,
                    uri = %uri,
                    "no transport clients for cluster, cannot build tracker"
                );
                return None;
            }
        };
        let scheme = uri.scheme().to_lowercase();
        match clients.get(&scheme) {
            Some(transport) => Some(Arc::new(TrackerClient::new(
                uri.clone(),
                partition_data,
                Arc::clone(transport),
            ))),
            None => {
                warn!(
                    cluster = cluster_name,
                    uri = %uri,
                    scheme = %scheme,
                    "no transport client for scheme, cannot build tracker"
                );
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Listener notification
    // ------------------------------------------------------------------

    fn listeners_snapshot(&self) -> Vec<Arc<dyn BalancerStateListener>> {
        self.listeners
            .read()
            .expect("listener list lock poisoned")
            .clone()
    }

    pub(crate) fn notify_client_added(&self, cluster_name: &str, client: &Arc<TrackerClient>) {
        for listener in self.listeners_snapshot() {
            listener.on_client_added(cluster_name, client);
        }
    }

    pub(crate) fn notify_client_removed(&self, cluster_name: &str, client: &Arc<TrackerClient>) {
        for listener in self.listeners_snapshot() {
            listener.on_client_removed(cluster_name, client);
        }
    }

    pub(crate) fn notify_strategy_added(
        &self,
        service_name: &str,
        scheme: &str,
        strategy: &Arc<dyn LoadBalancerStrategy>,
    ) {
        for listener in self.listeners_snapshot() {
            listener.on_strategy_added(service_name, scheme, strategy);
        }
    }

    pub(crate) fn notify_strategy_removed(
        &self,
        service_name: &str,
        scheme: &str,
        strategy: &Arc<dyn LoadBalancerStrategy>,
    ) {
        for listener in self.listeners_snapshot() {
            listener.on_strategy_removed(service_name, scheme, strategy);
        }
    }

    // ------------------------------------------------------------------
    // Read paths, safe from any thread
    // ------------------------------------------------------------------

    pub(crate) fn tracker_client(&self, cluster_name: &str, uri: &Url) -> Option<Arc<TrackerClient>> {
        match self.tracker_clients.get(cluster_name) {
            Some(trackers) => trackers.get(uri).map(|entry| Arc::clone(entry.value())),
            None => {
                warn!(
                    cluster = cluster_name,
                    uri = %uri,
                    "tracker client requested for unknown cluster"
                );
                None
            }
        }
    }

    pub(crate) fn transport_client(
        &self,
        cluster_name: &str,
        scheme: &str,
    ) -> Option<Arc<dyn TransportClient>> {
        match self.cluster_clients.get(cluster_name) {
            Some(clients) => {
                let client = clients.get(&scheme.to_lowercase()).cloned();
                if client.is_none() {
                    warn!(
                        cluster = cluster_name,
                        scheme = scheme,
                        "no transport client for scheme"
                    );
                }
                client
            }
            None => {
                warn!(
                    cluster = cluster_name,
                    "transport client requested for unknown cluster"
                );
                None
            }
        }
    }

    pub(crate) fn strategy(
        &self,
        service_name: &str,
        scheme: &str,
    ) -> Option<Arc<dyn LoadBalancerStrategy>> {
        match self.service_strategies.get(service_name) {
            Some(strategies) => strategies.get(scheme).cloned(),
            None => {
                warn!(
                    service = service_name,
                    "strategy requested for unknown service"
                );
                None
            }
        }
    }

    /// Ordered (scheme, strategy) list for a service, memoized until the
    /// next strategy refresh.
    pub(crate) fn strategies_for_service(
        &self,
        service_name: &str,
        prioritized_schemes: &[String],
    ) -> Arc<Vec<SchemeStrategyPair>> {
        if let Some(cached) = self.strategies_cache.get(service_name) {
            return Arc::clone(cached.value());
        }

        let mut ordered = Vec::with_capacity(prioritized_schemes.len());
        for scheme in prioritized_schemes {
            match self.strategy(service_name, scheme) {
                Some(strategy) => ordered.push(SchemeStrategyPair {
                    scheme: scheme.clone(),
                    strategy,
                }),
                None => {
                    warn!(
                        service = service_name,
                        scheme = %scheme,
                        "no strategy for scheme, skipping"
                    );
                }
            }
        }

        let ordered = Arc::new(ordered);
        self.strategies_cache
            .insert(service_name.to_string(), Arc::clone(&ordered));
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{
        ShutdownCallback, TransportError, TransportRequest, TransportResponse,
    };
    use futures::future::BoxFuture;

    struct NullTransport;

    impl TransportClient for NullTransport {
        fn request(
            &self,
            _request: TransportRequest,
        ) -> BoxFuture<'static, Result<TransportResponse, TransportError>> {
            Box::pin(async { Ok(TransportResponse::ok(Default::default())) })
        }

        fn shutdown(&self, on_complete: ShutdownCallback) {
            on_complete(Ok(()));
        }
    }

    fn core() -> StateCore {
        StateCore::new(HashMap::new(), HashMap::new())
    }

    #[test]
    fn test_versions_are_strictly_increasing() {
        let core = core();
        let first = core.next_version();
        let second = core.next_version();
        let third = core.next_version();
        assert!(first < second && second < third);
        assert_eq!(core.version.load(Ordering::SeqCst), third);
    }

    #[test]
    fn test_build_tracker_requires_scheme_client() {
        let core = core();
        let uri = Url::parse("http://h1:8080").unwrap();

        // Unknown cluster.
        assert!(core
            .build_tracker("sna-1", &uri, PartitionDataMap::new())
            .is_none());

        // Cluster known, but only an https client registered.
        let clients: HashMap<String, Arc<dyn TransportClient>> =
            HashMap::from([("https".to_string(), Arc::new(NullTransport) as _)]);
        core.cluster_clients
            .insert("sna-1".to_string(), Arc::new(clients));
        assert!(core
            .build_tracker("sna-1", &uri, PartitionDataMap::new())
            .is_none());

        // Matching scheme.
        let https_uri = Url::parse("https://h1:8443").unwrap();
        let tracker = core
            .build_tracker("sna-1", &https_uri, PartitionDataMap::new())
            .unwrap();
        assert_eq!(tracker.uri(), &https_uri);
    }

    #[test]
    fn test_stale_lookups_return_none() {
        let core = core();
        assert!(core
            .tracker_client("nowhere", &Url::parse("http://h1:80").unwrap())
            .is_none());
        assert!(core.transport_client("nowhere", "http").is_none());
        assert!(core.strategy("nowhere", "http").is_none());
    }
}
