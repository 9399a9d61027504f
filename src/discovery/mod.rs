//! Discovery event plumbing: the single-writer event loop and the property
//! event buses that feed the reconciliation engine.

mod bus;
mod event_loop;

pub use bus::{PropertyEventBus, PropertyEventPublisher, PropertyEventSubscriber};
pub use event_loop::{EventLoop, EventLoopHandle, EventTask};
