//! Authoritative data model published by service discovery.
//!
//! Three property kinds drive the engine: [`UriProperties`] (live endpoint
//! sets), [`ClusterProperties`] (transport configuration), and
//! [`ServiceProperties`] (balancing configuration). The partition submodule
//! models how a cluster's key space maps onto partitions.

mod cluster;
mod partition;
mod service;
mod uri;

pub use cluster::ClusterProperties;
pub use partition::{
    accessor_for, HashAlgorithm, PartitionAccessor, PartitionData, PartitionDataMap,
    PartitionError, PartitionId, PartitionProperties, DEFAULT_PARTITION_ID,
};
pub use service::{ServiceProperties, StrategyProperties};
pub use uri::UriProperties;
