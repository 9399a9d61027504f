//! Property event bus: fans one publisher's updates out to per-name
//! subscribers.
//!
//! One bus exists per property kind. The delivery contract, per
//! subscription name:
//!
//! - exactly one `on_initialize` as the first callback, carrying the
//!   current value (which may be "known absent"),
//! - then `on_add` / `on_remove` in publisher order.
//!
//! Every callback runs as a task on the event loop, so subscribers may
//! mutate engine state without further synchronization. A subscriber that
//! registers after the first publication receives its `on_initialize`
//! immediately from the bus's retained value.

use crate::discovery::event_loop::EventLoopHandle;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

/// Receives property events. All callbacks are invoked on the event loop.
///
/// `value` is `None` when the property is known to be absent, which is a
/// legal published state distinct from "never heard of".
pub trait PropertyEventSubscriber<T>: Send + Sync {
    /// First callback for a subscription: the property's current value.
    fn on_initialize(&self, name: &str, value: Option<&T>);

    /// The property was republished.
    fn on_add(&self, name: &str, value: Option<&T>);

    /// The property disappeared from discovery.
    fn on_remove(&self, name: &str);
}

/// Source of property events, driven by the bus.
///
/// When the first subscriber registers for a name that has not been
/// published yet, the bus asks the publisher to start publishing it. The
/// publisher must respond with `publish_initialize` followed by
/// `publish_add` / `publish_remove` in source order.
pub trait PropertyEventPublisher<T>: Send + Sync {
    /// Begin sourcing events for `name`.
    fn start_publishing(&self, name: &str);

    /// Stop sourcing events for `name`.
    fn stop_publishing(&self, name: &str);
}

struct BusState<T> {
    publisher: Option<Arc<dyn PropertyEventPublisher<T>>>,
    /// Retained last value per published name. Presence of a key means the
    /// name has initialized; the inner `Option` is the known-absent state.
    published: HashMap<String, Option<Arc<T>>>,
    subscribers: HashMap<String, Vec<Arc<dyn PropertyEventSubscriber<T>>>>,
}

struct BusInner<T> {
    event_loop: EventLoopHandle,
    state: Mutex<BusState<T>>,
}

/// Multiplexes one property kind's events to named subscriptions.
///
/// Cheap to clone; clones share the same bus.
pub struct PropertyEventBus<T> {
    inner: Arc<BusInner<T>>,
}

impl<T> Clone for PropertyEventBus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> PropertyEventBus<T> {
    /// Create a bus without a publisher. Values arrive only through the
    /// `publish_*` methods.
    pub fn new(event_loop: EventLoopHandle) -> Self {
        Self {
            inner: Arc::new(BusInner {
                event_loop,
                state: Mutex::new(BusState {
                    publisher: None,
                    published: HashMap::new(),
                    subscribers: HashMap::new(),
                }),
            }),
        }
    }

    /// Attach the publisher that sources events for this bus.
    pub fn set_publisher(&self, publisher: Arc<dyn PropertyEventPublisher<T>>) {
        let inner = Arc::clone(&self.inner);
        self.inner.event_loop.submit("bus: set publisher", move || {
            let mut state = lock_state(&inner);
            state.publisher = Some(publisher);
        });
    }

    /// Subscribe to a set of property names.
    ///
    /// Names that already initialized get an immediate `on_initialize`
    /// with the retained value; otherwise the publisher (if any) is asked
    /// to start publishing the name.
    pub fn register(
        &self,
        names: Vec<String>,
        subscriber: Arc<dyn PropertyEventSubscriber<T>>,
    ) {
        let inner = Arc::clone(&self.inner);
        self.inner.event_loop.submit("bus: register", move || {
            let mut state = lock_state(&inner);
            for name in names {
                trace!(property = %name, "bus subscription added");
                let first_for_name = state
                    .subscribers
                    .get(&name)
                    .map_or(true, |subs| subs.is_empty());
                state
                    .subscribers
                    .entry(name.clone())
                    .or_default()
                    .push(Arc::clone(&subscriber));

                if let Some(current) = state.published.get(&name) {
                    subscriber.on_initialize(&name, current.as_deref());
                } else if first_for_name {
                    if let Some(publisher) = &state.publisher {
                        publisher.start_publishing(&name);
                    }
                }
            }
        });
    }

    /// Drop a subscriber from a set of property names.
    ///
    /// When the last subscriber for a name goes away the publisher is told
    /// to stop publishing it; the retained value stays.
    pub fn unregister(
        &self,
        names: Vec<String>,
        subscriber: Arc<dyn PropertyEventSubscriber<T>>,
    ) {
        let inner = Arc::clone(&self.inner);
        self.inner.event_loop.submit("bus: unregister", move || {
            let mut state = lock_state(&inner);
            for name in names {
                let now_empty = match state.subscribers.get_mut(&name) {
                    Some(subs) => {
                        subs.retain(|s| !Arc::ptr_eq(s, &subscriber));
                        subs.is_empty()
                    }
                    None => false,
                };
                if now_empty {
                    state.subscribers.remove(&name);
                    if let Some(publisher) = &state.publisher {
                        publisher.stop_publishing(&name);
                    }
                }
            }
        });
    }

    /// Publish the first value for a name.
    ///
    /// A repeated initialize for an already-published name is delivered as
    /// an update.
    pub fn publish_initialize(&self, name: impl Into<String>, value: Option<T>) {
        let inner = Arc::clone(&self.inner);
        let name = name.into();
        self.inner
            .event_loop
            .submit("bus: publish initialize", move || {
                let mut state = lock_state(&inner);
                let value = value.map(Arc::new);
                let already_published = state.published.contains_key(&name);
                state.published.insert(name.clone(), value.clone());
                if already_published {
                    debug!(property = %name, "duplicate initialize, delivering as update");
                }
                for subscriber in subscribers_for(&state, &name) {
                    if already_published {
                        subscriber.on_add(&name, value.as_deref());
                    } else {
                        subscriber.on_initialize(&name, value.as_deref());
                    }
                }
            });
    }

    /// Publish an updated value for a name.
    ///
    /// An update for a name that never initialized is delivered as the
    /// initialization, keeping the first-callback contract for sloppy
    /// publishers.
    pub fn publish_add(&self, name: impl Into<String>, value: Option<T>) {
        let inner = Arc::clone(&self.inner);
        let name = name.into();
        self.inner.event_loop.submit("bus: publish add", move || {
            let mut state = lock_state(&inner);
            let value = value.map(Arc::new);
            let already_published = state.published.contains_key(&name);
            state.published.insert(name.clone(), value.clone());
            for subscriber in subscribers_for(&state, &name) {
                if already_published {
                    subscriber.on_add(&name, value.as_deref());
                } else {
                    subscriber.on_initialize(&name, value.as_deref());
                }
            }
        });
    }

    /// Publish the disappearance of a name.
    ///
    /// The retained value is dropped; a later publication re-initializes.
    pub fn publish_remove(&self, name: impl Into<String>) {
        let inner = Arc::clone(&self.inner);
        let name = name.into();
        self.inner
            .event_loop
            .submit("bus: publish remove", move || {
                let mut state = lock_state(&inner);
                state.published.remove(&name);
                for subscriber in subscribers_for(&state, &name) {
                    subscriber.on_remove(&name);
                }
            });
    }
}

fn lock_state<T>(inner: &BusInner<T>) -> std::sync::MutexGuard<'_, BusState<T>> {
    inner.state.lock().expect("bus state lock poisoned")
}

fn subscribers_for<T>(
    state: &BusState<T>,
    name: &str,
) -> Vec<Arc<dyn PropertyEventSubscriber<T>>> {
    state.subscribers.get(name).cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::event_loop::{EventLoop, EventLoopHandle};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct RecordingSubscriber {
        events: StdMutex<Vec<String>>,
    }

    impl PropertyEventSubscriber<String> for RecordingSubscriber {
        fn on_initialize(&self, name: &str, value: Option<&String>) {
            self.events
                .lock()
                .unwrap()
                .push(format!("init:{}:{:?}", name, value));
        }

        fn on_add(&self, name: &str, value: Option<&String>) {
            self.events
                .lock()
                .unwrap()
                .push(format!("add:{}:{:?}", name, value));
        }

        fn on_remove(&self, name: &str) {
            self.events.lock().unwrap().push(format!("remove:{}", name));
        }
    }

    async fn drain(handle: &EventLoopHandle) {
        let (tx, rx) = oneshot::channel();
        handle.submit("test barrier", move || {
            let _ = tx.send(());
        });
        tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .expect("event loop stalled")
            .expect("barrier dropped");
    }

    #[tokio::test]
    async fn test_initialize_then_add_then_remove() {
        let (event_loop, handle) = EventLoop::new();
        tokio::spawn(event_loop.run(CancellationToken::new()));
        let bus: PropertyEventBus<String> = PropertyEventBus::new(handle.clone());

        let subscriber = Arc::new(RecordingSubscriber::default());
        bus.register(vec!["svc".to_string()], subscriber.clone());
        bus.publish_initialize("svc", Some("v1".to_string()));
        bus.publish_add("svc", Some("v2".to_string()));
        bus.publish_remove("svc");
        drain(&handle).await;

        let events = subscriber.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "init:svc:Some(\"v1\")".to_string(),
                "add:svc:Some(\"v2\")".to_string(),
                "remove:svc".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_retained_value() {
        let (event_loop, handle) = EventLoop::new();
        tokio::spawn(event_loop.run(CancellationToken::new()));
        let bus: PropertyEventBus<String> = PropertyEventBus::new(handle.clone());

        bus.publish_initialize("svc", Some("v1".to_string()));
        let subscriber = Arc::new(RecordingSubscriber::default());
        bus.register(vec!["svc".to_string()], subscriber.clone());
        drain(&handle).await;

        let events = subscriber.events.lock().unwrap().clone();
        assert_eq!(events, vec!["init:svc:Some(\"v1\")".to_string()]);
    }

    #[tokio::test]
    async fn test_known_absent_is_a_legal_payload() {
        let (event_loop, handle) = EventLoop::new();
        tokio::spawn(event_loop.run(CancellationToken::new()));
        let bus: PropertyEventBus<String> = PropertyEventBus::new(handle.clone());

        let subscriber = Arc::new(RecordingSubscriber::default());
        bus.register(vec!["svc".to_string()], subscriber.clone());
        bus.publish_initialize("svc", None);
        drain(&handle).await;

        let events = subscriber.events.lock().unwrap().clone();
        assert_eq!(events, vec!["init:svc:None".to_string()]);
    }

    #[tokio::test]
    async fn test_add_before_initialize_initializes() {
        let (event_loop, handle) = EventLoop::new();
        tokio::spawn(event_loop.run(CancellationToken::new()));
        let bus: PropertyEventBus<String> = PropertyEventBus::new(handle.clone());

        let subscriber = Arc::new(RecordingSubscriber::default());
        bus.register(vec!["svc".to_string()], subscriber.clone());
        bus.publish_add("svc", Some("v1".to_string()));
        drain(&handle).await;

        let events = subscriber.events.lock().unwrap().clone();
        assert_eq!(events, vec!["init:svc:Some(\"v1\")".to_string()]);
    }

    #[tokio::test]
    async fn test_unregister_stops_delivery() {
        let (event_loop, handle) = EventLoop::new();
        tokio::spawn(event_loop.run(CancellationToken::new()));
        let bus: PropertyEventBus<String> = PropertyEventBus::new(handle.clone());

        let subscriber = Arc::new(RecordingSubscriber::default());
        bus.register(vec!["svc".to_string()], subscriber.clone());
        bus.publish_initialize("svc", Some("v1".to_string()));
        bus.unregister(vec!["svc".to_string()], subscriber.clone());
        bus.publish_add("svc", Some("v2".to_string()));
        drain(&handle).await;

        let events = subscriber.events.lock().unwrap().clone();
        assert_eq!(events, vec!["init:svc:Some(\"v1\")".to_string()]);
    }

    struct CountingPublisher {
        started: StdMutex<Vec<String>>,
        stopped: StdMutex<Vec<String>>,
    }

    impl PropertyEventPublisher<String> for CountingPublisher {
        fn start_publishing(&self, name: &str) {
            self.started.lock().unwrap().push(name.to_string());
        }

        fn stop_publishing(&self, name: &str) {
            self.stopped.lock().unwrap().push(name.to_string());
        }
    }

    #[tokio::test]
    async fn test_publisher_started_once_per_name() {
        let (event_loop, handle) = EventLoop::new();
        tokio::spawn(event_loop.run(CancellationToken::new()));
        let bus: PropertyEventBus<String> = PropertyEventBus::new(handle.clone());

        let publisher = Arc::new(CountingPublisher {
            started: StdMutex::new(Vec::new()),
            stopped: StdMutex::new(Vec::new()),
        });
        bus.set_publisher(publisher.clone());

        let first = Arc::new(RecordingSubscriber::default());
        let second = Arc::new(RecordingSubscriber::default());
        bus.register(vec!["svc".to_string()], first.clone());
        bus.register(vec!["svc".to_string()], second.clone());
        drain(&handle).await;
        assert_eq!(*publisher.started.lock().unwrap(), vec!["svc".to_string()]);

        bus.unregister(vec!["svc".to_string()], first);
        bus.unregister(vec!["svc".to_string()], second);
        drain(&handle).await;
        assert_eq!(*publisher.stopped.lock().unwrap(), vec!["svc".to_string()]);
    }
}
