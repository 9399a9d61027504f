//! URI properties: the live endpoint set of a cluster.

use crate::properties::partition::PartitionDataMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// The set of live endpoint URIs for a cluster, with per-URI partition
/// weights.
///
/// Published by discovery whenever hosts announce or retire. The engine
/// diffs consecutive versions to create and drop tracker clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UriProperties {
    cluster_name: String,
    partition_descriptions: HashMap<Url, PartitionDataMap>,
}

impl UriProperties {
    /// Create URI properties for a cluster.
    pub fn new(
        cluster_name: impl Into<String>,
        partition_descriptions: HashMap<Url, PartitionDataMap>,
    ) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            partition_descriptions,
        }
    }

    /// Name of the cluster these endpoints belong to.
    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// The announced endpoint URIs.
    pub fn uris(&self) -> impl Iterator<Item = &Url> {
        self.partition_descriptions.keys()
    }

    /// Whether `uri` is part of the announced set.
    pub fn contains(&self, uri: &Url) -> bool {
        self.partition_descriptions.contains_key(uri)
    }

    /// Partition weights for one endpoint.
    pub fn partition_data(&self, uri: &Url) -> Option<&PartitionDataMap> {
        self.partition_descriptions.get(uri)
    }

    /// Number of announced endpoints.
    pub fn uri_count(&self) -> usize {
        self.partition_descriptions.len()
    }

    /// True when no endpoints are announced.
    pub fn is_empty(&self) -> bool {
        self.partition_descriptions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::partition::PartitionData;

    fn url(s: &str) -> Url {
        Url::parse(s).expect("test url")
    }

    fn weights(partition: u32, weight: f64) -> PartitionDataMap {
        HashMap::from([(partition, PartitionData::new(weight))])
    }

    #[test]
    fn test_uris_and_partition_data() {
        let h1 = url("http://h1:80");
        let h2 = url("http://h2:80");
        let props = UriProperties::new(
            "sna-1",
            HashMap::from([(h1.clone(), weights(0, 1.0)), (h2.clone(), weights(1, 0.5))]),
        );

        assert_eq!(props.cluster_name(), "sna-1");
        assert_eq!(props.uri_count(), 2);
        assert!(props.contains(&h1));
        assert!(!props.contains(&url("http://h3:80")));
        assert_eq!(props.partition_data(&h2).unwrap()[&1].weight, 0.5);
    }
}
