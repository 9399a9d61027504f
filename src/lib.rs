//! Relaymap - client-side service load balancing driven by discovery.
//!
//! A client application asks "give me a client for service S" and gets a
//! live, per-endpoint tracker that routes requests to a healthy backend,
//! honoring the service's scheme preferences, partitioning scheme, and
//! strategy configuration. Configuration is streamed from an external
//! discovery backend as property events; the engine keeps a locally
//! consistent projection of that state and the derived clients in sync.
//!
//! # High-Level API
//!
//! ```ignore
//! use relaymap::balancer::BalancerState;
//! use relaymap::discovery::EventLoop;
//! use tokio_util::sync::CancellationToken;
//!
//! let (event_loop, handle) = EventLoop::new();
//! tokio::spawn(event_loop.run(CancellationToken::new()));
//!
//! let state = BalancerState::builder(handle)
//!     .client_factory("http", http_factory)
//!     .with_round_robin_strategy()
//!     .build();
//!
//! // Attach a discovery publisher to the buses, then:
//! state.listen_to_service("browsemaps", Box::new(|_, _| {
//!     // configuration is live; state.strategy(...) now resolves
//! }));
//! ```

pub mod balancer;
pub mod discovery;
pub mod logging;
pub mod properties;
pub mod strategy;
pub mod transport;

/// Version of the relaymap library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_not_empty() {
        assert!(!VERSION.is_empty());
    }
}
