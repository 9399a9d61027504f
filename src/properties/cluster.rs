//! Cluster properties: transport configuration shared by a cluster's hosts.

use crate::properties::partition::PartitionProperties;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Transport configuration for a cluster.
///
/// `prioritized_schemes` is the cluster's preferred URI scheme order; the
/// engine instantiates one transport client per scheme it has a factory
/// for. `properties` is opaque configuration handed through to the
/// transport client factories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterProperties {
    cluster_name: String,
    prioritized_schemes: Vec<String>,
    properties: HashMap<String, String>,
    partition_properties: PartitionProperties,
}

impl ClusterProperties {
    /// Create cluster properties with the given scheme preference order,
    /// no opaque properties, and no partitioning.
    pub fn new(cluster_name: impl Into<String>, prioritized_schemes: Vec<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            prioritized_schemes,
            properties: HashMap::new(),
            partition_properties: PartitionProperties::None,
        }
    }

    /// Attach opaque transport configuration.
    pub fn with_properties(mut self, properties: HashMap<String, String>) -> Self {
        self.properties = properties;
        self
    }

    /// Declare a partitioning scheme.
    pub fn with_partition_properties(mut self, partition_properties: PartitionProperties) -> Self {
        self.partition_properties = partition_properties;
        self
    }

    /// Name of the cluster.
    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// Preferred scheme order, most preferred first.
    pub fn prioritized_schemes(&self) -> &[String] {
        &self.prioritized_schemes
    }

    /// Opaque transport configuration.
    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    /// Declared partitioning scheme.
    pub fn partition_properties(&self) -> &PartitionProperties {
        &self.partition_properties
    }
}
