//! Shared subscriber machinery: waiter queues and the listen handshake.
//!
//! Each property subscriber keeps a queue of one-shot callbacks per
//! property name. The first `ensure_listening` call for a name installs
//! the queue and registers with the bus; every caller's callback is either
//! enqueued (initialization still pending) or invoked immediately (the
//! queue is already closed). When the first `on_initialize` for the name
//! arrives, the queue closes irrevocably and the accumulated callbacks
//! fire exactly once each.

use crate::discovery::{PropertyEventBus, PropertyEventSubscriber};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;

/// Which property kind completed initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// A cluster's endpoint set.
    Uri,
    /// A cluster's transport configuration.
    Cluster,
    /// A service's balancing configuration.
    Service,
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uri => "uri",
            Self::Cluster => "cluster",
            Self::Service => "service",
        };
        f.write_str(name)
    }
}

/// One-shot callback fired when a property finishes first-time
/// initialization.
pub type ListenCallback = Box<dyn FnOnce(PropertyKind, &str) + Send + 'static>;

/// A queue that accepts items until it is closed, exactly once.
///
/// `offer` and `close` are mutually exclusive: `close` takes the
/// accumulated items and rejects all later offers, handing the rejected
/// item back to the caller.
pub(crate) struct ClosableQueue<T> {
    slots: Mutex<Option<Vec<T>>>,
}

impl<T> ClosableQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Mutex::new(Some(Vec::new())),
        }
    }

    /// Enqueue an item. Returns the item back when the queue has closed.
    pub(crate) fn offer(&self, item: T) -> Option<T> {
        let mut slots = self.slots.lock().expect("waiter queue lock poisoned");
        match slots.as_mut() {
            Some(items) => {
                items.push(item);
                None
            }
            None => Some(item),
        }
    }

    /// Close the queue and take the accumulated items. Closing twice
    /// yields an empty list.
    pub(crate) fn close(&self) -> Vec<T> {
        let mut slots = self.slots.lock().expect("waiter queue lock poisoned");
        slots.take().unwrap_or_default()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.slots
            .lock()
            .expect("waiter queue lock poisoned")
            .is_none()
    }
}

/// Waiter bookkeeping shared by the three property subscribers.
pub(crate) struct SubscriberCore {
    kind: PropertyKind,
    waiters: DashMap<String, ClosableQueue<ListenCallback>>,
}

impl SubscriberCore {
    pub(crate) fn new(kind: PropertyKind) -> Self {
        Self {
            kind,
            waiters: DashMap::new(),
        }
    }

    pub(crate) fn kind(&self) -> PropertyKind {
        self.kind
    }

    /// Number of property names ever listened to.
    pub(crate) fn listen_count(&self) -> usize {
        self.waiters.len()
    }

    /// Whether `name` has completed first-time initialization.
    pub(crate) fn is_listening(&self, name: &str) -> bool {
        self.waiters
            .get(name)
            .map(|queue| queue.is_closed())
            .unwrap_or(false)
    }

    /// Install or join the waiter queue for `name`.
    ///
    /// Returns `(register, rejected)`: `register` is true for exactly one
    /// caller per name, the one that must register with the bus;
    /// `rejected` hands the callback back when the queue already closed,
    /// in which case the caller invokes it directly.
    pub(crate) fn enqueue_waiter(
        &self,
        name: &str,
        callback: ListenCallback,
    ) -> (bool, Option<ListenCallback>) {
        let mut register = false;
        let rejected = {
            let queue = self.waiters.entry(name.to_string()).or_insert_with(|| {
                register = true;
                ClosableQueue::new()
            });
            queue.offer(callback)
        };
        (register, rejected)
    }

    /// Close the waiter queue for `name` and fire the accumulated
    /// callbacks, each exactly once.
    pub(crate) fn complete_initialization(&self, name: &str) {
        let drained = {
            let queue = self.waiters.get(name);
            match queue {
                Some(queue) => queue.close(),
                None => Vec::new(),
            }
        };
        for callback in drained {
            callback(self.kind, name);
        }
    }
}

/// The `ensure_listening` handshake, shared by the three subscribers.
///
/// Enqueues the callback before registering with the bus so that the
/// `on_initialize` the registration triggers always finds it. Exactly one
/// caller per name performs the registration.
pub(crate) fn ensure_listening<T, S>(
    subscriber: &Arc<S>,
    core: &SubscriberCore,
    bus: &PropertyEventBus<T>,
    name: &str,
    callback: ListenCallback,
) where
    T: Send + Sync + 'static,
    S: PropertyEventSubscriber<T> + 'static,
{
    let (register, rejected) = core.enqueue_waiter(name, callback);
    if let Some(callback) = rejected {
        // Lost the race against close: the property is already
        // initialized.
        callback(core.kind(), name);
    }
    if register {
        bus.register(
            vec![name.to_string()],
            Arc::clone(subscriber) as Arc<dyn PropertyEventSubscriber<T>>,
        );
    }
}
