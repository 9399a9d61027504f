//! Observer interface for derived-state changes.

use crate::balancer::TrackerClient;
use crate::strategy::LoadBalancerStrategy;
use std::sync::Arc;

/// Observes tracker-client and strategy lifecycle events.
///
/// All callbacks run on the event loop, so implementations must not block
/// and must not wait on engine state changes. During a strategy refresh
/// every removal for the old map is delivered before any addition for the
/// new map, so listeners keyed on (service, scheme) see replacements in a
/// safe order.
pub trait BalancerStateListener: Send + Sync {
    /// A tracker client was created for an endpoint of `cluster_name`.
    fn on_client_added(&self, cluster_name: &str, client: &Arc<TrackerClient>);

    /// A tracker client was dropped. Its transport client may live on.
    fn on_client_removed(&self, cluster_name: &str, client: &Arc<TrackerClient>);

    /// A strategy now serves (`service_name`, `scheme`).
    fn on_strategy_added(
        &self,
        service_name: &str,
        scheme: &str,
        strategy: &Arc<dyn LoadBalancerStrategy>,
    );

    /// A strategy no longer serves (`service_name`, `scheme`).
    fn on_strategy_removed(
        &self,
        service_name: &str,
        scheme: &str,
        strategy: &Arc<dyn LoadBalancerStrategy>,
    );
}
