//! Partitioning model for clusters.
//!
//! A cluster may be split into partitions so that a request key maps to a
//! subset of its hosts. Discovery publishes the partitioning scheme as part
//! of [`ClusterProperties`](crate::properties::ClusterProperties); this
//! module turns that declaration into a [`PartitionAccessor`] that resolves
//! keys (or request URIs) to partition ids.
//!
//! Three schemes are supported:
//!
//! - **None**: the cluster is a single partition; every key resolves to
//!   [`DEFAULT_PARTITION_ID`].
//! - **Range-based**: keys are integers laid out in equal-size contiguous
//!   ranges, `partition_id = (key - key_range_start) / partition_size`.
//! - **Hash-based**: keys are hashed (or parsed) and reduced modulo the
//!   partition count.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::Arc;
use thiserror::Error;
use twox_hash::XxHash64;
use url::Url;

/// Identifier of a partition within a cluster.
pub type PartitionId = u32;

/// The partition id used by clusters that declare no partitioning.
pub const DEFAULT_PARTITION_ID: PartitionId = 0;

/// Per-partition weight assigned to a host URI.
///
/// A weight of zero means the host is declared for the partition but must
/// not receive traffic for it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartitionData {
    /// Relative capacity of the host within the partition.
    pub weight: f64,
}

impl PartitionData {
    /// Create partition data with the given weight.
    pub fn new(weight: f64) -> Self {
        Self { weight }
    }
}

/// Map from partition id to the host's weight in that partition.
pub type PartitionDataMap = HashMap<PartitionId, PartitionData>;

/// Hash function used by hash-based partitioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// Parse the key as an unsigned integer and reduce it modulo the
    /// partition count.
    Modulo,
    /// Hash the key bytes with XXH64 and reduce modulo the partition count.
    XxHash,
}

/// Partitioning scheme declared in cluster properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PartitionProperties {
    /// The cluster is not partitioned.
    None,
    /// Equal-size contiguous key ranges.
    ///
    /// `partition_key_regex` extracts the key from a request URI; its first
    /// capture group is the key.
    RangeBased {
        partition_key_regex: String,
        key_range_start: u64,
        partition_size: u64,
        partition_count: u32,
    },
    /// Keys map to partitions through a hash function.
    HashBased {
        partition_key_regex: String,
        partition_count: u32,
        hash_algorithm: HashAlgorithm,
    },
}

impl PartitionProperties {
    /// Number of partitions this scheme declares.
    pub fn partition_count(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::RangeBased {
                partition_count, ..
            } => *partition_count,
            Self::HashBased {
                partition_count, ..
            } => *partition_count,
        }
    }
}

/// Errors raised while resolving a key to a partition.
#[derive(Debug, Error)]
pub enum PartitionError {
    /// The scheme requires a numeric key and the key did not parse.
    #[error("partition key '{key}' is not numeric")]
    NonNumericKey { key: String },

    /// The key falls outside the declared key range.
    #[error("partition key {key} outside range [{range_start}, {range_end})")]
    KeyOutOfRange {
        key: u64,
        range_start: u64,
        range_end: u64,
    },

    /// The key regex did not match the request URI.
    #[error("no partition key found in uri '{uri}'")]
    NoKeyInUri { uri: String },

    /// The declared key regex failed to compile.
    #[error("invalid partition key regex '{pattern}': {reason}")]
    InvalidKeyRegex { pattern: String, reason: String },

    /// The declared scheme is internally inconsistent.
    #[error("invalid partition properties: {0}")]
    InvalidProperties(String),
}

/// Resolves request keys to partition ids for one cluster.
///
/// Accessors are pure and cheap; a new one is derived every time the
/// cluster's properties are republished.
pub trait PartitionAccessor: Send + Sync {
    /// Number of partitions the accessor resolves into.
    fn partition_count(&self) -> u32;

    /// Resolve a raw key to its partition.
    fn partition_for_key(&self, key: &str) -> Result<PartitionId, PartitionError>;

    /// Extract the partition key from a request URI and resolve it.
    ///
    /// Schemes without a key regex resolve every URI to the default
    /// partition.
    fn partition_for_uri(&self, uri: &Url) -> Result<PartitionId, PartitionError>;
}

/// Build the accessor for a declared partitioning scheme.
///
/// # Errors
///
/// Returns [`PartitionError::InvalidKeyRegex`] when the declared key regex
/// does not compile, and [`PartitionError::InvalidProperties`] when the
/// scheme declares a zero partition size or count.
pub fn accessor_for(
    properties: &PartitionProperties,
) -> Result<Arc<dyn PartitionAccessor>, PartitionError> {
    match properties {
        PartitionProperties::None => Ok(Arc::new(SinglePartitionAccessor)),
        PartitionProperties::RangeBased {
            partition_key_regex,
            key_range_start,
            partition_size,
            partition_count,
        } => {
            if *partition_size == 0 || *partition_count == 0 {
                return Err(PartitionError::InvalidProperties(
                    "range-based partitioning requires a non-zero size and count".to_string(),
                ));
            }
            Ok(Arc::new(RangeBasedPartitionAccessor {
                key_regex: compile_key_regex(partition_key_regex)?,
                key_range_start: *key_range_start,
                partition_size: *partition_size,
                partition_count: *partition_count,
            }))
        }
        PartitionProperties::HashBased {
            partition_key_regex,
            partition_count,
            hash_algorithm,
        } => {
            if *partition_count == 0 {
                return Err(PartitionError::InvalidProperties(
                    "hash-based partitioning requires a non-zero count".to_string(),
                ));
            }
            Ok(Arc::new(HashBasedPartitionAccessor {
                key_regex: compile_key_regex(partition_key_regex)?,
                partition_count: *partition_count,
                hash_algorithm: *hash_algorithm,
            }))
        }
    }
}

fn compile_key_regex(pattern: &str) -> Result<Regex, PartitionError> {
    Regex::new(pattern).map_err(|e| PartitionError::InvalidKeyRegex {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Extract the partition key from a URI using the compiled key regex.
///
/// The first capture group is the key; if the pattern has no groups the
/// whole match is used.
fn key_from_uri(regex: &Regex, uri: &Url) -> Result<String, PartitionError> {
    let target = uri.as_str();
    let captures = regex
        .captures(target)
        .ok_or_else(|| PartitionError::NoKeyInUri {
            uri: target.to_string(),
        })?;
    let key = captures
        .get(1)
        .or_else(|| captures.get(0))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| PartitionError::NoKeyInUri {
            uri: target.to_string(),
        })?;
    Ok(key)
}

/// Accessor for unpartitioned clusters.
struct SinglePartitionAccessor;

impl PartitionAccessor for SinglePartitionAccessor {
    fn partition_count(&self) -> u32 {
        1
    }

    fn partition_for_key(&self, _key: &str) -> Result<PartitionId, PartitionError> {
        Ok(DEFAULT_PARTITION_ID)
    }

    fn partition_for_uri(&self, _uri: &Url) -> Result<PartitionId, PartitionError> {
        Ok(DEFAULT_PARTITION_ID)
    }
}

/// Accessor for equal-size contiguous key ranges.
struct RangeBasedPartitionAccessor {
    key_regex: Regex,
    key_range_start: u64,
    partition_size: u64,
    partition_count: u32,
}

impl RangeBasedPartitionAccessor {
    fn range_end(&self) -> u64 {
        self.key_range_start + self.partition_size * u64::from(self.partition_count)
    }
}

impl PartitionAccessor for RangeBasedPartitionAccessor {
    fn partition_count(&self) -> u32 {
        self.partition_count
    }

    fn partition_for_key(&self, key: &str) -> Result<PartitionId, PartitionError> {
        let numeric: u64 = key
            .trim()
            .parse()
            .map_err(|_| PartitionError::NonNumericKey {
                key: key.to_string(),
            })?;
        if numeric < self.key_range_start || numeric >= self.range_end() {
            return Err(PartitionError::KeyOutOfRange {
                key: numeric,
                range_start: self.key_range_start,
                range_end: self.range_end(),
            });
        }
        Ok(((numeric - self.key_range_start) / self.partition_size) as PartitionId)
    }

    fn partition_for_uri(&self, uri: &Url) -> Result<PartitionId, PartitionError> {
        let key = key_from_uri(&self.key_regex, uri)?;
        self.partition_for_key(&key)
    }
}

/// Accessor that hashes keys onto partitions.
struct HashBasedPartitionAccessor {
    key_regex: Regex,
    partition_count: u32,
    hash_algorithm: HashAlgorithm,
}

impl PartitionAccessor for HashBasedPartitionAccessor {
    fn partition_count(&self) -> u32 {
        self.partition_count
    }

    fn partition_for_key(&self, key: &str) -> Result<PartitionId, PartitionError> {
        let bucket = match self.hash_algorithm {
            HashAlgorithm::Modulo => {
                let numeric: u64 =
                    key.trim()
                        .parse()
                        .map_err(|_| PartitionError::NonNumericKey {
                            key: key.to_string(),
                        })?;
                numeric % u64::from(self.partition_count)
            }
            HashAlgorithm::XxHash => {
                let mut hasher = XxHash64::with_seed(0);
                hasher.write(key.as_bytes());
                hasher.finish() % u64::from(self.partition_count)
            }
        };
        Ok(bucket as PartitionId)
    }

    fn partition_for_uri(&self, uri: &Url) -> Result<PartitionId, PartitionError> {
        let key = key_from_uri(&self.key_regex, uri)?;
        self.partition_for_key(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).expect("test url")
    }

    #[test]
    fn test_single_partition_resolves_everything_to_zero() {
        let accessor = accessor_for(&PartitionProperties::None).unwrap();
        assert_eq!(accessor.partition_count(), 1);
        assert_eq!(accessor.partition_for_key("anything").unwrap(), 0);
        assert_eq!(
            accessor
                .partition_for_uri(&url("http://host:80/member/42"))
                .unwrap(),
            DEFAULT_PARTITION_ID
        );
    }

    #[test]
    fn test_range_based_partitioning() {
        let accessor = accessor_for(&PartitionProperties::RangeBased {
            partition_key_regex: r"/member/(\d+)".to_string(),
            key_range_start: 0,
            partition_size: 1000,
            partition_count: 4,
        })
        .unwrap();

        assert_eq!(accessor.partition_for_key("0").unwrap(), 0);
        assert_eq!(accessor.partition_for_key("999").unwrap(), 0);
        assert_eq!(accessor.partition_for_key("1000").unwrap(), 1);
        assert_eq!(accessor.partition_for_key("3999").unwrap(), 3);
    }

    #[test]
    fn test_range_based_rejects_out_of_range_keys() {
        let accessor = accessor_for(&PartitionProperties::RangeBased {
            partition_key_regex: r"/member/(\d+)".to_string(),
            key_range_start: 1000,
            partition_size: 100,
            partition_count: 2,
        })
        .unwrap();

        assert!(matches!(
            accessor.partition_for_key("999"),
            Err(PartitionError::KeyOutOfRange { .. })
        ));
        assert!(matches!(
            accessor.partition_for_key("1200"),
            Err(PartitionError::KeyOutOfRange { .. })
        ));
        assert!(matches!(
            accessor.partition_for_key("abc"),
            Err(PartitionError::NonNumericKey { .. })
        ));
    }

    #[test]
    fn test_range_based_extracts_key_from_uri() {
        let accessor = accessor_for(&PartitionProperties::RangeBased {
            partition_key_regex: r"/member/(\d+)".to_string(),
            key_range_start: 0,
            partition_size: 1000,
            partition_count: 4,
        })
        .unwrap();

        let partition = accessor
            .partition_for_uri(&url("http://host:80/member/2500"))
            .unwrap();
        assert_eq!(partition, 2);

        assert!(matches!(
            accessor.partition_for_uri(&url("http://host:80/company/7")),
            Err(PartitionError::NoKeyInUri { .. })
        ));
    }

    #[test]
    fn test_hash_based_modulo() {
        let accessor = accessor_for(&PartitionProperties::HashBased {
            partition_key_regex: r"/member/(\d+)".to_string(),
            partition_count: 8,
            hash_algorithm: HashAlgorithm::Modulo,
        })
        .unwrap();

        assert_eq!(accessor.partition_for_key("16").unwrap(), 0);
        assert_eq!(accessor.partition_for_key("19").unwrap(), 3);
        assert!(matches!(
            accessor.partition_for_key("not-a-number"),
            Err(PartitionError::NonNumericKey { .. })
        ));
    }

    #[test]
    fn test_hash_based_xxhash_is_stable_and_in_range() {
        let accessor = accessor_for(&PartitionProperties::HashBased {
            partition_key_regex: r"/resource/(\w+)".to_string(),
            partition_count: 4,
            hash_algorithm: HashAlgorithm::XxHash,
        })
        .unwrap();

        let first = accessor.partition_for_key("session-abc").unwrap();
        let second = accessor.partition_for_key("session-abc").unwrap();
        assert_eq!(first, second);
        assert!(first < 4);
    }

    #[test]
    fn test_invalid_declarations_are_rejected() {
        assert!(matches!(
            accessor_for(&PartitionProperties::RangeBased {
                partition_key_regex: r"(\d+)".to_string(),
                key_range_start: 0,
                partition_size: 0,
                partition_count: 4,
            }),
            Err(PartitionError::InvalidProperties(_))
        ));

        assert!(matches!(
            accessor_for(&PartitionProperties::HashBased {
                partition_key_regex: "([unclosed".to_string(),
                partition_count: 4,
                hash_algorithm: HashAlgorithm::XxHash,
            }),
            Err(PartitionError::InvalidKeyRegex { .. })
        ));
    }
}
