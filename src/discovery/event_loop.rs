//! The event loop: a single-consumer task queue that serializes every
//! mutation of balancer state.
//!
//! All discovery callbacks and every write path of the engine run as tasks
//! on this loop, one at a time, in submission order. Readers never go
//! through the loop; they read the concurrent maps directly.
//!
//! # Example
//!
//! ```ignore
//! use relaymap::discovery::EventLoop;
//! use tokio_util::sync::CancellationToken;
//!
//! let (event_loop, handle) = EventLoop::new();
//! tokio::spawn(event_loop.run(CancellationToken::new()));
//!
//! handle.submit("apply update", move || { /* mutate state */ });
//! handle.shutdown(move || { /* all earlier tasks have run */ });
//! ```

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// A unit of work executed on the event loop.
pub type EventTask = Box<dyn FnOnce() + Send + 'static>;

enum LoopMessage {
    Task { label: &'static str, task: EventTask },
    Shutdown { on_drained: EventTask },
}

/// Sending side of the event loop. Cloneable and shareable.
#[derive(Clone)]
pub struct EventLoopHandle {
    sender: mpsc::UnboundedSender<LoopMessage>,
}

impl EventLoopHandle {
    /// Enqueue a task. Returns immediately.
    ///
    /// Tasks run strictly in submission order. Returns false when the loop
    /// has already stopped, in which case the task is dropped.
    pub fn submit(&self, label: &'static str, task: impl FnOnce() + Send + 'static) -> bool {
        let accepted = self
            .sender
            .send(LoopMessage::Task {
                label,
                task: Box::new(task),
            })
            .is_ok();
        if !accepted {
            warn!(label, "event loop stopped, dropping task");
        }
        accepted
    }

    /// Enqueue a drain marker.
    ///
    /// Every task submitted before this call runs first; then `on_drained`
    /// is invoked and the loop stops. Tasks submitted afterwards are
    /// dropped. Returns false when the loop has already stopped.
    pub fn shutdown(&self, on_drained: impl FnOnce() + Send + 'static) -> bool {
        let accepted = self
            .sender
            .send(LoopMessage::Shutdown {
                on_drained: Box::new(on_drained),
            })
            .is_ok();
        if !accepted {
            warn!("event loop stopped, shutdown callback dropped");
        }
        accepted
    }
}

/// The receiving half. Run it as a dedicated task.
pub struct EventLoop {
    receiver: mpsc::UnboundedReceiver<LoopMessage>,
}

impl EventLoop {
    /// Create a loop and its handle.
    pub fn new() -> (Self, EventLoopHandle) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { receiver }, EventLoopHandle { sender })
    }

    /// Run until a shutdown marker is processed, every handle is dropped,
    /// or `abort` is cancelled.
    ///
    /// Cancellation is abrupt: pending tasks are dropped without running.
    /// Graceful teardown goes through [`EventLoopHandle::shutdown`].
    pub async fn run(mut self, abort: CancellationToken) {
        debug!("event loop starting");

        loop {
            tokio::select! {
                biased;

                _ = abort.cancelled() => {
                    info!("event loop aborted");
                    break;
                }

                message = self.receiver.recv() => {
                    match message {
                        Some(LoopMessage::Task { label, task }) => {
                            trace!(label, "running event task");
                            task();
                        }
                        Some(LoopMessage::Shutdown { on_drained }) => {
                            info!("event loop drained");
                            on_drained();
                            break;
                        }
                        None => {
                            debug!("all event loop handles dropped");
                            break;
                        }
                    }
                }
            }
        }
    }
}
