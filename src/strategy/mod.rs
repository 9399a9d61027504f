//! Load balancer strategy abstraction.
//!
//! A strategy picks a host for a request among a service's tracker
//! clients. The engine instantiates one strategy per (service, scheme)
//! through registered factories and replaces them whenever the service's
//! configuration or its cluster's scheme set changes. The selection
//! algorithm itself is entirely up to the factory; this crate bundles a
//! baseline [`RoundRobinStrategy`] and nothing else.

mod round_robin;

pub use round_robin::{RoundRobinStrategy, RoundRobinStrategyFactory, ROUND_ROBIN_STRATEGY_NAME};

use crate::balancer::TrackerClient;
use crate::properties::{PartitionId, StrategyProperties};
use std::fmt;
use std::sync::Arc;

/// Per-(service, scheme) host selector.
pub trait LoadBalancerStrategy: Send + Sync {
    /// The strategy's registered name.
    fn name(&self) -> &str;

    /// Pick a client for a request targeting `partition_id`.
    ///
    /// `candidates` is the current tracker-client set of the service's
    /// cluster; returns `None` when no candidate can take the request.
    fn select_client(
        &self,
        partition_id: PartitionId,
        candidates: &[Arc<TrackerClient>],
    ) -> Option<Arc<TrackerClient>>;
}

/// Creates strategies for one registered strategy name.
///
/// Factories are registered at engine construction and are immutable for
/// the engine's lifetime.
pub trait StrategyFactory: Send + Sync {
    /// Create a strategy for a service.
    ///
    /// `properties` is the service's opaque strategy configuration; each
    /// strategy receives its own copy.
    fn new_strategy(
        &self,
        service_name: &str,
        properties: StrategyProperties,
    ) -> Arc<dyn LoadBalancerStrategy>;
}

/// A scheme paired with the strategy serving it, in cluster priority order.
#[derive(Clone)]
pub struct SchemeStrategyPair {
    /// URI scheme the strategy serves.
    pub scheme: String,
    /// The strategy instance.
    pub strategy: Arc<dyn LoadBalancerStrategy>,
}

impl fmt::Debug for SchemeStrategyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemeStrategyPair")
            .field("scheme", &self.scheme)
            .field("strategy", &self.strategy.name())
            .finish()
    }
}
