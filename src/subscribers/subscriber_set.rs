//! # Fan-out from the bus listener to subscribers.
//!
//! ```text
//! emit(&event)
//!   for each subscriber:
//!     ├─ !accepts(kind)       ──► skipped
//!     ├─ try_send Ok          ──► queue ──► worker ──► on_event()
//!     │                                       └─ panic ──► SubscriberPanicked
//!     └─ try_send Full/Closed ──► SubscriberOverflow (never for overflow events)
//! ```
//!
//! `emit()` never awaits, so the bus listener keeps pace with the supervisor
//! regardless of how slow a subscriber is. Ordering holds per subscriber only.
//!
//! Panics are caught with `AssertUnwindSafe`: a subscriber that panics while
//! holding a lock of its own may leave that state poisoned.

use std::any::Any;
use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

struct Lane {
    sub: Arc<dyn Subscribe>,
    queue: mpsc::Sender<Arc<Event>>,
}

/// Set of subscribers, each behind its own bounded queue and worker.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Spawns one worker per subscriber. Must run inside a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let (lanes, workers) = subs
            .into_iter()
            .map(|sub| {
                let (queue, rx) = mpsc::channel(sub.queue_capacity().max(1));
                let worker = tokio::spawn(run_worker(Arc::clone(&sub), rx, bus.clone()));
                (Lane { sub, queue }, worker)
            })
            .unzip();
        Self {
            lanes,
            workers,
            bus,
        }
    }

    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// Queues `event` for every subscriber that accepts its kind.
    pub fn emit(&self, event: &Event) {
        let mut shared: Option<Arc<Event>> = None;

        for lane in self.lanes.iter().filter(|l| l.sub.accepts(event.kind)) {
            let ev = shared.get_or_insert_with(|| Arc::new(event.clone()));
            let reason = match lane.queue.try_send(Arc::clone(ev)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if event.kind != EventKind::SubscriberOverflow {
                self.bus
                    .publish(Event::subscriber_overflow(lane.sub.name(), reason));
            }
        }
    }

    /// Closes every queue and waits until the workers drained them.
    pub async fn shutdown(self) {
        drop(self.lanes);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

async fn run_worker(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(ev) = rx.recv().await {
        let handled = std::panic::AssertUnwindSafe(sub.on_event(&ev))
            .catch_unwind()
            .await;
        // A panic while handling a panic report is not reported again.
        if let Err(payload) = handled {
            if ev.kind != EventKind::SubscriberPanicked {
                bus.publish(Event::subscriber_panicked(sub.name(), panic_message(&*payload)));
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&'static str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
