//! Tracker clients: per-endpoint views onto a cluster's transport client.

use crate::properties::{PartitionDataMap, PartitionId};
use crate::transport::{TransportClient, TransportError, TransportRequest, TransportResponse};
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// A lightweight per-(cluster, URI) client.
///
/// Pairs an endpoint URI and its partition weights with the transport
/// client serving the URI's scheme. Tracker clients own no I/O resources;
/// they are created and discarded freely as endpoints churn, while the
/// underlying transport client lives on in the cluster's client map.
pub struct TrackerClient {
    uri: Url,
    partition_data: PartitionDataMap,
    transport: Arc<dyn TransportClient>,
}

impl TrackerClient {
    /// Create a tracker for an endpoint.
    pub fn new(
        uri: Url,
        partition_data: PartitionDataMap,
        transport: Arc<dyn TransportClient>,
    ) -> Self {
        Self {
            uri,
            partition_data,
            transport,
        }
    }

    /// The endpoint URI.
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// The endpoint's partition weights.
    pub fn partition_data(&self) -> &PartitionDataMap {
        &self.partition_data
    }

    /// Weight of this endpoint in `partition_id`, or `None` when the
    /// endpoint does not serve the partition.
    pub fn partition_weight(&self, partition_id: PartitionId) -> Option<f64> {
        self.partition_data.get(&partition_id).map(|data| data.weight)
    }

    /// The transport client backing this endpoint.
    pub fn transport(&self) -> &Arc<dyn TransportClient> {
        &self.transport
    }

    /// Dispatch a request to this endpoint through the backing transport.
    pub fn request(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'static, Result<TransportResponse, TransportError>> {
        self.transport.request(request)
    }
}

impl fmt::Debug for TrackerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerClient")
            .field("uri", &self.uri.as_str())
            .field("partitions", &self.partition_data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::PartitionData;
    use crate::transport::ShutdownCallback;
    use std::collections::HashMap;

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

    #[test]
    fn test_partition_weight_lookup() {
        let tracker = TrackerClient::new(
            Url::parse("https://h1:8443").unwrap(),
            HashMap::from([(0, PartitionData::new(1.0)), (2, PartitionData::new(0.25))]),
            Arc::new(NullTransport),
        );

        assert_eq!(tracker.partition_weight(0), Some(1.0));
        assert_eq!(tracker.partition_weight(2), Some(0.25));
        assert_eq!(tracker.partition_weight(1), None);
        assert_eq!(tracker.uri().scheme(), "https");
    }
}
