//! Service properties: which cluster a service lives on and how to balance
//! across its hosts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque strategy configuration, passed through to the strategy factory.
pub type StrategyProperties = HashMap<String, serde_json::Value>;

/// Balancing configuration for one service.
///
/// `strategy_list` names strategies in fallback order; the first name with
/// a registered factory wins. `strategy_name` is the legacy single-name
/// field consulted only when the list is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceProperties {
    service_name: String,
    cluster_name: String,
    strategy_list: Vec<String>,
    strategy_name: Option<String>,
    strategy_properties: StrategyProperties,
}

impl ServiceProperties {
    /// Create service properties with a prioritized strategy list.
    pub fn new(
        service_name: impl Into<String>,
        cluster_name: impl Into<String>,
        strategy_list: Vec<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            cluster_name: cluster_name.into(),
            strategy_list,
            strategy_name: None,
            strategy_properties: StrategyProperties::new(),
        }
    }

    /// Set the legacy single-strategy name.
    pub fn with_strategy_name(mut self, strategy_name: impl Into<String>) -> Self {
        self.strategy_name = Some(strategy_name.into());
        self
    }

    /// Attach opaque strategy configuration.
    pub fn with_strategy_properties(mut self, strategy_properties: StrategyProperties) -> Self {
        self.strategy_properties = strategy_properties;
        self
    }

    /// Name of the service.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Name of the cluster hosting the service.
    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// Strategy names in fallback order.
    pub fn strategy_list(&self) -> &[String] {
        &self.strategy_list
    }

    /// Legacy single-strategy name.
    pub fn strategy_name(&self) -> Option<&str> {
        self.strategy_name.as_deref()
    }

    /// Opaque strategy configuration.
    pub fn strategy_properties(&self) -> &StrategyProperties {
        &self.strategy_properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_fields() {
        let props = ServiceProperties::new(
            "browsemaps",
            "sna-1",
            vec!["degrader".to_string(), "round-robin".to_string()],
        )
        .with_strategy_name("round-robin")
        .with_strategy_properties(HashMap::from([(
            "max-ring-points".to_string(),
            serde_json::json!(100),
        )]));

        assert_eq!(props.service_name(), "browsemaps");
        assert_eq!(props.cluster_name(), "sna-1");
        assert_eq!(props.strategy_list(), ["degrader", "round-robin"]);
        assert_eq!(props.strategy_name(), Some("round-robin"));
        assert_eq!(
            props.strategy_properties()["max-ring-points"],
            serde_json::json!(100)
        );
    }
}
