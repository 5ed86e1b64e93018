//! # Subscriber trait.
//!
//! [`Subscribe`] is how a host (an editor extension, a CLI, a test) observes
//! node lifecycles without polling the supervisor.
//!
//! A subscriber is driven by its own worker inside the
//! [`SubscriberSet`](crate::SubscriberSet):
//! - events arrive one at a time, in publication order;
//! - the queue in front of the worker holds [`Subscribe::queue_capacity`] events,
//!   anything beyond is dropped for this subscriber and reported as `SubscriberOverflow`;
//! - a panic inside `on_event` is reported as `SubscriberPanicked` and the
//!   worker moves on to the next event.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use nodevisor::{Event, EventKind, Subscribe};
//!
//! struct CrashNotifier;
//!
//! #[async_trait]
//! impl Subscribe for CrashNotifier {
//!     async fn on_event(&self, ev: &Event) {
//!         eprintln!("node on port {:?} went away: {:?}", ev.port, ev.reason);
//!     }
//!
//!     fn name(&self) -> &'static str { "crash-notifier" }
//!
//!     fn accepts(&self, kind: EventKind) -> bool {
//!         matches!(kind, EventKind::NodeExited)
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};

/// Receiver of supervisor lifecycle events.
///
/// `on_event` runs on a worker task; it should not block the executor.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event.
    async fn on_event(&self, event: &Event);

    /// Name reported in overflow and panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Events of other kinds are never queued for this subscriber.
    fn accepts(&self, _kind: EventKind) -> bool {
        true
    }

    /// Queue size in front of the worker (at least 1).
    fn queue_capacity(&self) -> usize {
        256
    }
}
