//! # Lifecycle event bus.
//!
//! Every component that reports something (supervisor, ownership probe,
//! readiness waiter, reconciler, subscriber workers) publishes into one
//! [`Bus`]. The supervisor's listener is the main receiver; tests and hosts can
//! take their own receivers through `NodeSupervisor::subscribe`.
//!
//! ```text
//! supervisor ─┐
//! probe      ─┤
//! readiness  ─┼─► Bus (broadcast ring) ─┬─► subscriber_listener ─► SubscriberSet
//! reconciler ─┤                         └─► NodeSupervisor::subscribe() receivers
//! workers    ─┘
//! ```
//!
//! Publishing never waits. A receiver that falls more than `capacity` events
//! behind gets `RecvError::Lagged` and loses the oldest ones. Events sent while
//! nobody listens are gone.

use tokio::sync::broadcast;

use super::event::Event;

/// Cloneable handle to the event broadcast channel.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Sends `ev` to the current receivers, if any.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
