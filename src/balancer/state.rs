//! The balancer state facade.
//!
//! `BalancerState` wires the three property subscribers to their buses,
//! serializes every mutation on the event loop, and exposes the lock-free
//! read API that request paths use to find transport clients, tracker
//! clients, and strategies.
//!
//! # Example
//!
//! ```ignore
//! use relaymap::balancer::BalancerState;
//! use relaymap::discovery::EventLoop;
//! use tokio_util::sync::CancellationToken;
//!
//! let (event_loop, handle) = EventLoop::new();
//! tokio::spawn(event_loop.run(CancellationToken::new()));
//!
//! let state = BalancerState::builder(handle)
//!     .client_factory("http", http_factory)
//!     .with_round_robin_strategy()
//!     .build();
//!
//! state.listen_to_service("browsemaps", Box::new(|kind, name| {
//!     // service configuration is now live
//! }));
//! ```

use crate::balancer::builder::BalancerStateBuilder;
use crate::balancer::cluster::ClusterSubscriber;
use crate::balancer::core::StateCore;
use crate::balancer::item::StateItem;
use crate::balancer::listener::BalancerStateListener;
use crate::balancer::service::ServiceSubscriber;
use crate::balancer::subscriber::{ListenCallback, PropertyKind};
use crate::balancer::tracker::TrackerClient;
use crate::balancer::uri::UriSubscriber;
use crate::discovery::{EventLoopHandle, PropertyEventBus};
use crate::properties::{
    ClusterProperties, PartitionAccessor, ServiceProperties, UriProperties,
};
use crate::strategy::{LoadBalancerStrategy, SchemeStrategyPair, StrategyFactory};
use crate::transport::{TransportClient, TransportClientFactory};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, trace, warn};
use url::Url;

/// The reconciliation engine behind the discovery event buses.
///
/// Writes are serialized on the event loop; the read methods are safe
/// from any thread and never block against it.
pub struct BalancerState {
    core: Arc<StateCore>,
    event_loop: EventLoopHandle,
    uri_bus: PropertyEventBus<UriProperties>,
    cluster_bus: PropertyEventBus<ClusterProperties>,
    service_bus: PropertyEventBus<ServiceProperties>,
    uri_subscriber: Arc<UriSubscriber>,
    cluster_subscriber: Arc<ClusterSubscriber>,
    service_subscriber: Arc<ServiceSubscriber>,
}

impl BalancerState {
    /// Start building an engine on the given event loop.
    pub fn builder(event_loop: EventLoopHandle) -> BalancerStateBuilder {
        BalancerStateBuilder::new(event_loop)
    }

    pub(crate) fn new(
        event_loop: EventLoopHandle,
        uri_bus: PropertyEventBus<UriProperties>,
        cluster_bus: PropertyEventBus<ClusterProperties>,
        service_bus: PropertyEventBus<ServiceProperties>,
        client_factories: HashMap<String, Arc<dyn TransportClientFactory>>,
        strategy_factories: HashMap<String, Arc<dyn StrategyFactory>>,
    ) -> Self {
        let core = Arc::new(StateCore::new(client_factories, strategy_factories));
        let uri_subscriber = Arc::new(UriSubscriber::new(Arc::clone(&core), uri_bus.clone()));
        let cluster_subscriber = Arc::new(ClusterSubscriber::new(
            Arc::clone(&core),
            cluster_bus.clone(),
        ));
        let service_subscriber = Arc::new(ServiceSubscriber::new(
            Arc::clone(&core),
            service_bus.clone(),
        ));

        Self {
            core,
            event_loop,
            uri_bus,
            cluster_bus,
            service_bus,
            uri_subscriber,
            cluster_subscriber,
            service_subscriber,
        }
    }

    /// The engine is passive; startup completes immediately.
    pub fn start(&self, callback: impl FnOnce() + Send + 'static) {
        callback();
    }

    // ------------------------------------------------------------------
    // Listening
    // ------------------------------------------------------------------

    /// Subscribe to a service and run `callback` once its configuration
    /// has initialized. Fires immediately when already initialized.
    pub fn listen_to_service(&self, service_name: &str, callback: ListenCallback) {
        trace!(service = service_name, "listen_to_service");
        self.service_subscriber
            .ensure_listening(service_name, callback);
    }

    /// Subscribe to a cluster and run `callback` once **both** its
    /// transport configuration and its endpoint set have initialized.
    pub fn listen_to_cluster(&self, cluster_name: &str, callback: ListenCallback) {
        trace!(cluster = cluster_name, "listen_to_cluster");

        let barrier = Arc::new(ListenBarrier {
            remaining: AtomicUsize::new(2),
            callback: Mutex::new(Some(callback)),
        });
        self.cluster_subscriber
            .ensure_listening(cluster_name, barrier_callback(&barrier));
        self.uri_subscriber
            .ensure_listening(cluster_name, barrier_callback(&barrier));
    }

    /// Whether the cluster's transport configuration has initialized.
    pub fn is_listening_to_cluster(&self, cluster_name: &str) -> bool {
        self.cluster_subscriber.is_listening(cluster_name)
    }

    /// Whether the service's configuration has initialized.
    pub fn is_listening_to_service(&self, service_name: &str) -> bool {
        self.service_subscriber.is_listening(service_name)
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    /// Register an observer of derived-state changes. Takes effect in
    /// event order.
    pub fn register_listener(&self, listener: Arc<dyn BalancerStateListener>) {
        let core = Arc::clone(&self.core);
        self.event_loop.submit("register state listener", move || {
            core.listeners
                .write()
                .expect("listener list lock poisoned")
                .push(listener);
        });
    }

    /// Remove a previously registered observer.
    pub fn unregister_listener(&self, listener: &Arc<dyn BalancerStateListener>) {
        let core = Arc::clone(&self.core);
        let listener = Arc::clone(listener);
        self.event_loop
            .submit("unregister state listener", move || {
                core.listeners
                    .write()
                    .expect("listener list lock poisoned")
                    .retain(|existing| !Arc::ptr_eq(existing, &listener));
            });
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Tracker client for one endpoint of a cluster.
    pub fn tracker_client(&self, cluster_name: &str, uri: &Url) -> Option<Arc<TrackerClient>> {
        self.core.tracker_client(cluster_name, uri)
    }

    /// Transport client for a cluster and scheme.
    pub fn transport_client(
        &self,
        cluster_name: &str,
        scheme: &str,
    ) -> Option<Arc<dyn TransportClient>> {
        self.core.transport_client(cluster_name, scheme)
    }

    /// Strategy serving (service, scheme).
    pub fn strategy(
        &self,
        service_name: &str,
        scheme: &str,
    ) -> Option<Arc<dyn LoadBalancerStrategy>> {
        self.core.strategy(service_name, scheme)
    }

    /// Ordered (scheme, strategy) list for a service, memoized until the
    /// service's strategies are next refreshed.
    pub fn strategies_for_service(
        &self,
        service_name: &str,
        prioritized_schemes: &[String],
    ) -> Arc<Vec<SchemeStrategyPair>> {
        self.core
            .strategies_for_service(service_name, prioritized_schemes)
    }

    /// Versioned endpoint set of a cluster.
    pub fn uri_properties(&self, cluster_name: &str) -> Option<StateItem<UriProperties>> {
        self.core
            .uri_properties
            .get(cluster_name)
            .map(|entry| entry.value().clone())
    }

    /// Versioned transport configuration of a cluster.
    pub fn cluster_properties(&self, cluster_name: &str) -> Option<StateItem<ClusterProperties>> {
        self.core
            .cluster_info
            .get(cluster_name)
            .map(|entry| entry.value().properties_item().clone())
    }

    /// Versioned partition accessor of a cluster.
    pub fn partition_accessor(
        &self,
        cluster_name: &str,
    ) -> Option<StateItem<dyn PartitionAccessor>> {
        self.core
            .cluster_info
            .get(cluster_name)
            .map(|entry| entry.value().partition_accessor_item().clone())
    }

    /// Versioned configuration of a service.
    pub fn service_properties(&self, service_name: &str) -> Option<StateItem<ServiceProperties>> {
        self.core
            .service_properties
            .get(service_name)
            .map(|entry| entry.value().clone())
    }

    /// Transport client factory registered for a scheme.
    pub fn client_factory(&self, scheme: &str) -> Option<Arc<dyn TransportClientFactory>> {
        self.core.client_factories.get(scheme).cloned()
    }

    // ------------------------------------------------------------------
    // Observability
    // ------------------------------------------------------------------

    /// Current value of the global version counter.
    pub fn version(&self) -> u64 {
        self.core.version.load(Ordering::SeqCst)
    }

    /// Seed the version counter, in event order.
    pub fn set_version(&self, version: u64) {
        let core = Arc::clone(&self.core);
        self.event_loop.submit("set global version", move || {
            info!(version, "setting global version");
            core.version.store(version, Ordering::SeqCst);
        });
    }

    /// Number of clusters heard about.
    pub fn cluster_count(&self) -> usize {
        self.core.cluster_info.len()
    }

    /// Number of clusters with a stored endpoint set.
    pub fn uri_count(&self) -> usize {
        self.core.uri_properties.len()
    }

    /// Number of services heard about.
    pub fn service_count(&self) -> usize {
        self.core.service_properties.len()
    }

    /// Number of live tracker clients for a cluster.
    pub fn tracker_client_count(&self, cluster_name: &str) -> usize {
        self.core
            .tracker_clients
            .get(cluster_name)
            .map(|entry| entry.value().len())
            .unwrap_or(0)
    }

    /// Number of cluster names ever listened to.
    pub fn cluster_listen_count(&self) -> usize {
        self.cluster_subscriber.listen_count()
    }

    /// Number of service names ever listened to.
    pub fn service_listen_count(&self) -> usize {
        self.service_subscriber.listen_count()
    }

    /// Number of registered state listeners.
    pub fn listener_count(&self) -> usize {
        self.core
            .listeners
            .read()
            .expect("listener list lock poisoned")
            .len()
    }

    /// Schemes with a registered transport client factory.
    pub fn supported_schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.core.client_factories.keys().cloned().collect();
        schemes.sort();
        schemes
    }

    /// Strategy names with a registered factory.
    pub fn supported_strategies(&self) -> Vec<String> {
        let mut names: Vec<String> = self.core.strategy_factories.keys().cloned().collect();
        names.sort();
        names
    }

    // ------------------------------------------------------------------
    // Plumbing access
    // ------------------------------------------------------------------

    /// The event loop handle writes are serialized on.
    pub fn event_loop(&self) -> &EventLoopHandle {
        &self.event_loop
    }

    /// The bus carrying endpoint-set events.
    pub fn uri_bus(&self) -> &PropertyEventBus<UriProperties> {
        &self.uri_bus
    }

    /// The bus carrying cluster configuration events.
    pub fn cluster_bus(&self) -> &PropertyEventBus<ClusterProperties> {
        &self.cluster_bus
    }

    /// The bus carrying service configuration events.
    pub fn service_bus(&self) -> &PropertyEventBus<ServiceProperties> {
        &self.service_bus
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    /// Shut down every distinct transport client the engine owns, then
    /// run `callback`.
    ///
    /// The gathering happens on the event loop, so every update submitted
    /// before this call is reflected. Writes submitted afterwards are not
    /// guarded against.
    pub fn shutdown(&self, callback: impl FnOnce() + Send + 'static) {
        trace!("balancer state shutdown requested");
        let core = Arc::clone(&self.core);
        self.event_loop.submit("shutdown balancer state", move || {
            let mut clients: Vec<Arc<dyn TransportClient>> = Vec::new();
            for entry in core.cluster_clients.iter() {
                for client in entry.value().values() {
                    if !clients.iter().any(|known| Arc::ptr_eq(known, client)) {
                        clients.push(Arc::clone(client));
                    }
                }
            }

            info!(count = clients.len(), "shutting down cluster clients");
            if clients.is_empty() {
                callback();
                return;
            }

            let remaining = Arc::new(AtomicUsize::new(clients.len()));
            let callback: Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>> =
                Arc::new(Mutex::new(Some(Box::new(callback))));
            for client in clients {
                let remaining = Arc::clone(&remaining);
                let callback = Arc::clone(&callback);
                client.shutdown(Box::new(move |result| {
                    if let Err(error) = result {
                        warn!(error = %error, "transport client shutdown failed");
                    }
                    if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                        if let Some(callback) = callback
                            .lock()
                            .expect("shutdown callback lock poisoned")
                            .take()
                        {
                            callback();
                        }
                    }
                }));
            }
        });
    }
}

/// Two-count barrier behind `listen_to_cluster`: the caller's callback
/// fires only after both the cluster and URI properties initialized.
struct ListenBarrier {
    remaining: AtomicUsize,
    callback: Mutex<Option<ListenCallback>>,
}

fn barrier_callback(barrier: &Arc<ListenBarrier>) -> ListenCallback {
    let barrier = Arc::clone(barrier);
    Box::new(move |kind: PropertyKind, name: &str| {
        if barrier.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            if let Some(callback) = barrier
                .callback
                .lock()
                .expect("listen barrier lock poisoned")
                .take()
            {
                callback(kind, name);
            }
        }
    })
}
