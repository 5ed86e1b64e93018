//! # Lifecycle events emitted by the node supervisor.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Start events**: probe outcome, spawn, readiness progress, failure
//! - **Stop events**: stop requests, teardown and unsolicited exits
//! - **Disposal events**: supervisor-wide cleanup
//! - **Subscriber events**: overflow and panic reports from subscriber workers
//!
//! The [`Event`] struct carries additional metadata such as timestamps, node kind,
//! port, pid, attempt number, counts and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use nodevisor::{Event, EventKind, PortKey};
//!
//! let ev = Event::new(EventKind::ReadinessProbeFailed)
//!     .with_node("ganache")
//!     .with_port(PortKey::new(8545).unwrap())
//!     .with_attempt(2)
//!     .with_delay(Duration::from_secs(2));
//!
//! assert_eq!(ev.kind, EventKind::ReadinessProbeFailed);
//! assert_eq!(ev.node.as_deref(), Some("ganache"));
//! assert_eq!(ev.delay_ms, Some(2000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::port::PortKey;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Start events ===
    /// `start()` accepted a valid port and is about to probe it.
    ///
    /// Sets: `node`, `port`
    StartRequested,

    /// A running node of our kind was found; an attached handle was registered.
    ///
    /// Sets: `node`, `port`, `pid`
    NodeAttached,

    /// A child process was spawned and is being waited on.
    ///
    /// Sets: `node`, `port`, `pid` (child pid, if the OS reported one)
    NodeSpawned,

    /// A readiness probe failed; another attempt may follow.
    ///
    /// Sets: `node`, `port`, `attempt`, `delay_ms` (omitted after the last attempt)
    ReadinessProbeFailed,

    /// The spawned node answered its liveness probe and was registered as owned.
    ///
    /// Sets: `node`, `port`, `pid`, `attempt`
    NodeReady,

    /// `start()` failed; the registry holds no entry for the port.
    ///
    /// Sets: `node`, `port` (if valid), `reason` (error label)
    StartFailed,

    // === Stop events ===
    /// `stop()` found a registered handle and removed it.
    ///
    /// Sets: `node`, `port`, `pid`
    StopRequested,

    /// Teardown of a handle finished.
    ///
    /// Sets: `node`, `port`, `pid`, `reason` (`owned`, `attached`, `attached_kept`)
    NodeStopped,

    /// An owned process exited without being asked to; its handle was removed.
    ///
    /// Sets: `node`, `port`, `pid`, `reason` (exit code description)
    NodeExited,

    /// Out-of-band kill of an attached process failed.
    ///
    /// Sets: `node`, `port`, `pid`, `reason`
    KillFailed,

    /// The OS port lookup failed; the port was treated as free.
    ///
    /// Sets: `node`, `port`, `reason`
    LookupFailed,

    // === Disposal events ===
    /// `dispose_all()` started.
    ///
    /// Sets: `node`, `count` (number of registered ports)
    DisposeRequested,

    /// `dispose_all()` finished; the registry is empty.
    ///
    /// Sets: `node`, `count` (number of stop attempts), `reason` (failure count, if any)
    DisposeCompleted,

    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `subscriber`, `reason` (panic message)
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `subscriber`, `reason` (`full` or `closed`)
    SubscriberOverflow,
}

impl EventKind {
    /// Returns a short stable label (snake_case) for use in logs/telemetry.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::StartRequested => "start_requested",
            EventKind::NodeAttached => "node_attached",
            EventKind::NodeSpawned => "node_spawned",
            EventKind::ReadinessProbeFailed => "readiness_probe_failed",
            EventKind::NodeReady => "node_ready",
            EventKind::StartFailed => "start_failed",
            EventKind::StopRequested => "stop_requested",
            EventKind::NodeStopped => "node_stopped",
            EventKind::NodeExited => "node_exited",
            EventKind::KillFailed => "kill_failed",
            EventKind::LookupFailed => "lookup_failed",
            EventKind::DisposeRequested => "dispose_requested",
            EventKind::DisposeCompleted => "dispose_completed",
            EventKind::SubscriberPanicked => "subscriber_panicked",
            EventKind::SubscriberOverflow => "subscriber_overflow",
        }
    }
}

/// Lifecycle event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Node kind name.
    pub node: Option<Arc<str>>,
    /// Port the event refers to.
    pub port: Option<PortKey>,
    /// OS process id, when known.
    pub pid: Option<u32>,
    /// Readiness attempt number, starting from 1.
    pub attempt: Option<u32>,
    /// Number of ports (dispose events).
    pub count: Option<u32>,
    /// Name of the subscriber a subscriber event is about.
    pub subscriber: Option<&'static str>,
    /// Delay before the next attempt in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Human-readable reason (error label, exit status, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            node: None,
            port: None,
            pid: None,
            attempt: None,
            count: None,
            subscriber: None,
            delay_ms: None,
            reason: None,
        }
    }

    /// Attaches the node kind name.
    #[inline]
    pub fn with_node(mut self, node: impl Into<Arc<str>>) -> Self {
        self.node = Some(node.into());
        self
    }

    /// Attaches the port.
    #[inline]
    pub fn with_port(mut self, port: PortKey) -> Self {
        self.port = Some(port);
        self
    }

    /// Attaches a pid, if known.
    #[inline]
    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    /// Attaches a readiness attempt number.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a port count.
    #[inline]
    pub fn with_count(mut self, n: u32) -> Self {
        self.count = Some(n);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        let mut ev = Event::new(EventKind::SubscriberOverflow).with_reason(reason);
        ev.subscriber = Some(subscriber);
        ev
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        let mut ev = Event::new(EventKind::SubscriberPanicked).with_reason(info);
        ev.subscriber = Some(subscriber);
        ev
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::new(EventKind::StartRequested);
        let b = Event::new(EventKind::StartRequested);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn delay_is_saturated_to_u32() {
        let ev = Event::new(EventKind::ReadinessProbeFailed).with_delay(Duration::from_secs(u64::MAX));
        assert_eq!(ev.delay_ms, Some(u32::MAX));
    }

    #[test]
    fn subscriber_reports_name_the_subscriber_not_a_node() {
        let ev = Event::subscriber_overflow("telemetry", "full");
        assert_eq!(ev.subscriber, Some("telemetry"));
        assert!(ev.node.is_none());
        assert_eq!(ev.reason.as_deref(), Some("full"));
    }
}
