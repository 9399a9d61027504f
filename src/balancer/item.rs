//! Versioned wrappers around stored property values.

use crate::properties::{ClusterProperties, PartitionAccessor};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// A stored property value with its version and update time.
///
/// `value` is `None` when discovery declared the property absent, which is
/// distinct from the property never having been heard of (no item at all).
/// Versions come from the engine's single monotonic counter and are unique
/// across all property kinds.
pub struct StateItem<T: ?Sized> {
    value: Option<Arc<T>>,
    version: u64,
    updated_at: SystemTime,
}

impl<T: ?Sized> StateItem<T> {
    pub(crate) fn new(value: Option<Arc<T>>, version: u64) -> Self {
        Self {
            value,
            version,
            updated_at: SystemTime::now(),
        }
    }

    /// The stored value, or `None` for a known-absent property.
    pub fn value(&self) -> Option<&T> {
        self.value.as_deref()
    }

    /// A shared handle to the stored value.
    pub fn shared_value(&self) -> Option<Arc<T>> {
        self.value.clone()
    }

    /// Version assigned when the item was stored.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Wall-clock time the item was stored.
    pub fn updated_at(&self) -> SystemTime {
        self.updated_at
    }
}

impl<T: ?Sized> Clone for StateItem<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            version: self.version,
            updated_at: self.updated_at,
        }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for StateItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateItem")
            .field("value", &self.value)
            .field("version", &self.version)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// A cluster's properties and its derived partition accessor, stored
/// together so they can never drift apart.
///
/// Both items share one version, assigned when the cluster event was
/// applied.
#[derive(Clone)]
pub struct ClusterInfo {
    properties: StateItem<ClusterProperties>,
    partition_accessor: StateItem<dyn PartitionAccessor>,
}

impl ClusterInfo {
    pub(crate) fn new(
        properties: Option<Arc<ClusterProperties>>,
        partition_accessor: Option<Arc<dyn PartitionAccessor>>,
        version: u64,
    ) -> Self {
        Self {
            properties: StateItem::new(properties, version),
            partition_accessor: StateItem::new(partition_accessor, version),
        }
    }

    /// The cluster's versioned properties.
    pub fn properties_item(&self) -> &StateItem<ClusterProperties> {
        &self.properties
    }

    /// The versioned partition accessor derived from those properties.
    pub fn partition_accessor_item(&self) -> &StateItem<dyn PartitionAccessor> {
        &self.partition_accessor
    }
}

impl fmt::Debug for ClusterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterInfo")
            .field("properties", &self.properties)
            .field(
                "has_partition_accessor",
                &self.partition_accessor.value().is_some(),
            )
            .finish()
    }
}
