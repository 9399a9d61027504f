//! Integration tests for the listen handshake.
//!
//! Covers the `ensure_listening` contract end to end:
//! - callbacks fire exactly once per call, after first initialization
//! - the cluster listen barrier waits for both the cluster and the URI
//!   property
//! - callbacks registered after initialization fire immediately
//! - `is_listening_to_*` flips once initialization completes

use relaymap::balancer::{BalancerState, PropertyKind};
use relaymap::discovery::{EventLoop, EventLoopHandle};
use relaymap::properties::{ClusterProperties, ServiceProperties, UriProperties};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

fn fixture() -> (BalancerState, EventLoopHandle) {
    let (event_loop, handle) = EventLoop::new();
    tokio::spawn(event_loop.run(CancellationToken::new()));
    let state = BalancerState::builder(handle.clone()).build();
    (state, handle)
}

async fn drain(handle: &EventLoopHandle) {
    let (tx, rx) = oneshot::channel();
    handle.submit("test barrier", move || {
        let _ = tx.send(());
    });
    tokio::time::timeout(Duration::from_secs(2), rx)
        .await
        .expect("event loop stalled")
        .expect("barrier dropped");
}

#[tokio::test]
async fn test_service_listen_fires_once_after_initialization() {
    let (state, handle) = fixture();

    let fired = Arc::new(AtomicUsize::new(0));
    let observed = fired.clone();
    state.listen_to_service(
        "browsemaps",
        Box::new(move |kind, name| {
            assert_eq!(kind, PropertyKind::Service);
            assert_eq!(name, "browsemaps");
            observed.fetch_add(1, Ordering::SeqCst);
        }),
    );
    drain(&handle).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0, "nothing published yet");
    assert!(!state.is_listening_to_service("browsemaps"));

    state.service_bus().publish_initialize(
        "browsemaps",
        Some(ServiceProperties::new(
            "browsemaps",
            "sna-1",
            vec!["round-robin".to_string()],
        )),
    );
    drain(&handle).await;

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(state.is_listening_to_service("browsemaps"));

    // Updates after initialization never re-fire the callback.
    state.service_bus().publish_add(
        "browsemaps",
        Some(ServiceProperties::new(
            "browsemaps",
            "sna-1",
            vec!["round-robin".to_string()],
        )),
    );
    drain(&handle).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_every_waiter_fires_exactly_once() {
    let (state, handle) = fixture();

    let fired = Arc::new(AtomicUsize::new(0));
    for _ in 0..5 {
        let observed = fired.clone();
        state.listen_to_service(
            "browsemaps",
            Box::new(move |_, _| {
                observed.fetch_add(1, Ordering::SeqCst);
            }),
        );
    }
    state
        .service_bus()
        .publish_initialize("browsemaps", None);
    drain(&handle).await;
    assert_eq!(fired.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_listen_after_initialization_fires_immediately() {
    let (state, handle) = fixture();

    state.listen_to_service("browsemaps", Box::new(|_, _| {}));
    state
        .service_bus()
        .publish_initialize("browsemaps", None);
    drain(&handle).await;

    // Initialization already happened: the callback runs on the caller's
    // thread, before any further event-loop turn.
    let fired = Arc::new(AtomicUsize::new(0));
    let observed = fired.clone();
    state.listen_to_service(
        "browsemaps",
        Box::new(move |_, _| {
            observed.fetch_add(1, Ordering::SeqCst);
        }),
    );
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cluster_listen_waits_for_both_properties() {
    let (state, handle) = fixture();

    let fired = Arc::new(AtomicUsize::new(0));
    let observed = fired.clone();
    state.listen_to_cluster(
        "sna-1",
        Box::new(move |_, name| {
            assert_eq!(name, "sna-1");
            observed.fetch_add(1, Ordering::SeqCst);
        }),
    );

    // URI properties alone do not satisfy the barrier.
    state
        .uri_bus()
        .publish_initialize("sna-1", Some(UriProperties::new("sna-1", HashMap::new())));
    drain(&handle).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    // The cluster property completes the pair.
    state.cluster_bus().publish_initialize(
        "sna-1",
        Some(ClusterProperties::new("sna-1", vec!["http".to_string()])),
    );
    drain(&handle).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(state.is_listening_to_cluster("sna-1"));
}

#[tokio::test]
async fn test_cluster_listen_either_initialization_order() {
    let (state, handle) = fixture();

    let fired = Arc::new(AtomicUsize::new(0));
    let observed = fired.clone();
    state.listen_to_cluster(
        "sna-2",
        Box::new(move |_, _| {
            observed.fetch_add(1, Ordering::SeqCst);
        }),
    );

    // Cluster first this time.
    state.cluster_bus().publish_initialize(
        "sna-2",
        Some(ClusterProperties::new("sna-2", vec!["http".to_string()])),
    );
    drain(&handle).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    state
        .uri_bus()
        .publish_initialize("sna-2", Some(UriProperties::new("sna-2", HashMap::new())));
    drain(&handle).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_known_absent_initialization_completes_the_handshake() {
    let (state, handle) = fixture();

    let (tx, rx) = oneshot::channel();
    let slot = Arc::new(std::sync::Mutex::new(Some(tx)));
    state.listen_to_service(
        "ghost-service",
        Box::new(move |_, _| {
            if let Some(tx) = slot.lock().unwrap().take() {
                let _ = tx.send(());
            }
        }),
    );

    // "Known absent" still counts as initialization.
    state.service_bus().publish_initialize("ghost-service", None);
    drain(&handle).await;

    tokio::time::timeout(Duration::from_secs(2), rx)
        .await
        .expect("handshake never completed")
        .expect("callback dropped");
    assert!(state.is_listening_to_service("ghost-service"));
    assert!(state.service_properties("ghost-service").unwrap().value().is_none());
}

#[tokio::test]
async fn test_listen_counts_track_names_not_calls() {
    let (state, handle) = fixture();

    state.listen_to_service("svc-a", Box::new(|_, _| {}));
    state.listen_to_service("svc-a", Box::new(|_, _| {}));
    state.listen_to_service("svc-b", Box::new(|_, _| {}));
    state.listen_to_cluster("sna-1", Box::new(|_, _| {}));
    drain(&handle).await;

    assert_eq!(state.service_listen_count(), 2);
    assert_eq!(state.cluster_listen_count(), 1);
}
