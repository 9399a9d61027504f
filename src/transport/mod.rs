//! Transport client abstraction.
//!
//! A transport client is the heavy, per-(cluster, scheme) network resource
//! the engine owns and recycles. The engine never dispatches requests
//! itself; it creates clients through registered factories, hands them out
//! through [`TrackerClient`](crate::balancer::TrackerClient) wrappers, and
//! shuts the old client down asynchronously whenever a cluster's transport
//! configuration is republished.

use bytes::Bytes;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Errors surfaced by transport clients.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection to the endpoint could not be established.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The request was sent but failed or timed out.
    #[error("request failed: {0}")]
    Request(String),

    /// The client was asked to do work after shutdown.
    #[error("transport client is shut down")]
    Shutdown,

    /// Underlying I/O failure.
    #[error("transport i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Callback invoked when an asynchronous client shutdown finishes.
pub type ShutdownCallback = Box<dyn FnOnce(Result<(), TransportError>) + Send + 'static>;

/// A request dispatched through a transport client.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// Absolute endpoint URI.
    pub uri: Url,
    /// Opaque payload.
    pub body: Bytes,
}

impl TransportRequest {
    /// Create a request with an empty body.
    pub fn new(uri: Url) -> Self {
        Self {
            uri,
            body: Bytes::new(),
        }
    }

    /// Attach a payload.
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }
}

/// A response returned by a transport client.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// Status code, HTTP-like.
    pub status: u16,
    /// Opaque payload.
    pub body: Bytes,
}

impl TransportResponse {
    /// A successful response carrying `body`.
    pub fn ok(body: Bytes) -> Self {
        Self { status: 200, body }
    }

    /// Whether the status indicates success.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A network client bound to one (cluster, scheme) pair.
///
/// Implementations are provided by embedders through
/// [`TransportClientFactory`]. `shutdown` must be idempotent and must let
/// in-flight requests complete; the engine keeps no reference to a client
/// after requesting its shutdown.
pub trait TransportClient: Send + Sync {
    /// Dispatch a request to an endpoint of the cluster.
    fn request(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'static, Result<TransportResponse, TransportError>>;

    /// Release the client's resources asynchronously.
    ///
    /// `on_complete` fires exactly once, after in-flight requests have
    /// drained or failed.
    fn shutdown(&self, on_complete: ShutdownCallback);
}

/// Creates transport clients for one URI scheme.
///
/// Factories are registered at engine construction and are immutable for
/// the engine's lifetime.
pub trait TransportClientFactory: Send + Sync {
    /// Create a client configured by the cluster's opaque properties.
    fn new_client(&self, cluster_properties: &HashMap<String, String>) -> Arc<dyn TransportClient>;
}
