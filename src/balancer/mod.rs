//! The reconciliation engine.
//!
//! Maintains a locally consistent projection of discovery state (endpoint
//! sets, cluster configuration, service configuration) and keeps the
//! derived objects (transport clients, tracker clients, strategies) in
//! sync with it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        BalancerState                          │
//! │                                                               │
//! │  uri bus ──────► UriSubscriber ─────┐                        │
//! │  cluster bus ──► ClusterSubscriber ─┼──► StateCore           │
//! │  service bus ──► ServiceSubscriber ─┘    indexes + caches    │
//! │                                               │               │
//! │  (all callbacks serialized on the event loop) │               │
//! │                                               ▼               │
//! │  readers (any thread) ──► tracker / transport / strategy      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! A cluster event fans out the widest: it replaces the cluster's
//! transport clients, rebuilds its tracker clients, retires the old
//! transport clients asynchronously, and refreshes the strategies of
//! every service on the cluster.

mod builder;
mod cluster;
mod core;
mod item;
mod listener;
mod service;
mod state;
mod subscriber;
mod tracker;
mod uri;

pub use builder::BalancerStateBuilder;
pub use item::{ClusterInfo, StateItem};
pub use listener::BalancerStateListener;
pub use state::BalancerState;
pub use subscriber::{ListenCallback, PropertyKind};
pub use tracker::TrackerClient;
