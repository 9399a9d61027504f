//! Baseline round-robin strategy.

use crate::balancer::TrackerClient;
use crate::properties::{PartitionId, StrategyProperties};
use crate::strategy::{LoadBalancerStrategy, StrategyFactory};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Registered name of the bundled round-robin strategy.
pub const ROUND_ROBIN_STRATEGY_NAME: &str = "round-robin";

/// Rotates across the candidates that carry positive weight for the
/// requested partition.
///
/// Selection state is a single atomic cursor, so concurrent callers rotate
/// through the eligible set without coordination. Ignores strategy
/// properties.
pub struct RoundRobinStrategy {
    service_name: String,
    cursor: AtomicUsize,
}

impl RoundRobinStrategy {
    /// Create a strategy for a service.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// The service this strategy balances for.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

impl LoadBalancerStrategy for RoundRobinStrategy {
    fn name(&self) -> &str {
        ROUND_ROBIN_STRATEGY_NAME
    }

    fn select_client(
        &self,
        partition_id: PartitionId,
        candidates: &[Arc<TrackerClient>],
    ) -> Option<Arc<TrackerClient>> {
        let eligible: Vec<&Arc<TrackerClient>> = candidates
            .iter()
            .filter(|client| {
                client
                    .partition_weight(partition_id)
                    .map(|weight| weight > 0.0)
                    .unwrap_or(false)
            })
            .collect();

        if eligible.is_empty() {
            return None;
        }

        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % eligible.len();
        Some(Arc::clone(eligible[index]))
    }
}

/// Factory for [`RoundRobinStrategy`], registered as `"round-robin"`.
pub struct RoundRobinStrategyFactory;

impl StrategyFactory for RoundRobinStrategyFactory {
    fn new_strategy(
        &self,
        service_name: &str,
        _properties: StrategyProperties,
    ) -> Arc<dyn LoadBalancerStrategy> {
        Arc::new(RoundRobinStrategy::new(service_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::{PartitionData, PartitionDataMap};
    use crate::transport::{
        ShutdownCallback, TransportClient, TransportError, TransportRequest, TransportResponse,
    };
    use futures::future::BoxFuture;
    use std::collections::HashMap;
    use url::Url;

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

    fn tracker(uri: &str, partition: u32, weight: f64) -> Arc<TrackerClient> {
        let mut partitions = PartitionDataMap::new();
        partitions.insert(partition, PartitionData::new(weight));
        Arc::new(TrackerClient::new(
            Url::parse(uri).unwrap(),
            partitions,
            Arc::new(NullTransport),
        ))
    }

    #[test]
    fn test_rotates_through_eligible_candidates() {
        let strategy = RoundRobinStrategy::new("browsemaps");
        let candidates = vec![
            tracker("http://h1:80", 0, 1.0),
            tracker("http://h2:80", 0, 1.0),
            tracker("http://h3:80", 0, 1.0),
        ];

        let picks: Vec<String> = (0..6)
            .map(|_| {
                strategy
                    .select_client(0, &candidates)
                    .unwrap()
                    .uri()
                    .to_string()
            })
            .collect();

        assert_eq!(picks[0..3], picks[3..6]);
        let distinct: std::collections::HashSet<_> = picks.iter().collect();
        assert_eq!(distinct.len(), 3);
    }

    #[test]
    fn test_skips_wrong_partition_and_zero_weight() {
        let strategy = RoundRobinStrategy::new("browsemaps");
        let candidates = vec![
            tracker("http://h1:80", 0, 1.0),
            tracker("http://h2:80", 1, 1.0),
            tracker("http://h3:80", 0, 0.0),
        ];

        for _ in 0..4 {
            let pick = strategy.select_client(0, &candidates).unwrap();
            assert_eq!(pick.uri().as_str(), "http://h1/");
        }
    }

    #[test]
    fn test_no_candidates_returns_none() {
        let strategy = RoundRobinStrategy::new("browsemaps");
        assert!(strategy.select_client(0, &[]).is_none());

        let wrong_partition = vec![tracker("http://h1:80", 3, 1.0)];
        assert!(strategy.select_client(0, &wrong_partition).is_none());
    }

    #[test]
    fn test_factory_registers_name() {
        let factory = RoundRobinStrategyFactory;
        let strategy = factory.new_strategy("browsemaps", HashMap::new());
        assert_eq!(strategy.name(), ROUND_ROBIN_STRATEGY_NAME);
    }
}
