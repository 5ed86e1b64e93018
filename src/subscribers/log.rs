//! # LogWriter: event renderer over `tracing`
//!
//! A subscriber that turns incoming [`Event`]s into structured `tracing` records
//! under the `nodevisor::events` target. Installing a `tracing` subscriber is up
//! to the binary embedding the supervisor.
//!
//! `LookupFailed` is not rendered: the ownership probe already warns where the
//! lookup fails.
//!
//! ## Example output (fmt layer)
//! ```text
//! INFO nodevisor::events: start requested node="ganache" port=8545
//! DEBUG nodevisor::events: readiness probe failed node="ganache" port=8545 attempt=1 delay_ms=2000
//! INFO nodevisor::events: node ready node="ganache" port=8545 pid=4242 attempt=3
//! WARN nodevisor::events: start failed node="ganache" port=8545 reason="startup_timeout"
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let node = e.node.as_deref().unwrap_or("-");
        let port = e.port.map(|p| p.get());
        let reason = e.reason.as_deref();

        match e.kind {
            EventKind::StartRequested => {
                info!(target: "nodevisor::events", node, ?port, "start requested");
            }
            EventKind::NodeAttached => {
                info!(target: "nodevisor::events", node, ?port, pid = ?e.pid, "attached to running node");
            }
            EventKind::NodeSpawned => {
                info!(target: "nodevisor::events", node, ?port, pid = ?e.pid, "node process spawned");
            }
            EventKind::ReadinessProbeFailed => {
                debug!(
                    target: "nodevisor::events",
                    node, ?port, attempt = ?e.attempt, delay_ms = ?e.delay_ms,
                    "readiness probe failed"
                );
            }
            EventKind::NodeReady => {
                info!(
                    target: "nodevisor::events",
                    node, ?port, pid = ?e.pid, attempt = ?e.attempt,
                    "node ready"
                );
            }
            EventKind::StartFailed => {
                warn!(target: "nodevisor::events", node, ?port, ?reason, "start failed");
            }
            EventKind::StopRequested => {
                info!(target: "nodevisor::events", node, ?port, pid = ?e.pid, "stop requested");
            }
            EventKind::NodeStopped => {
                info!(target: "nodevisor::events", node, ?port, pid = ?e.pid, ?reason, "node stopped");
            }
            EventKind::NodeExited => {
                warn!(target: "nodevisor::events", node, ?port, pid = ?e.pid, ?reason, "node exited unexpectedly");
            }
            EventKind::KillFailed => {
                error!(target: "nodevisor::events", node, ?port, pid = ?e.pid, ?reason, "out-of-band kill failed");
            }
            EventKind::LookupFailed => {}
            EventKind::DisposeRequested => {
                info!(target: "nodevisor::events", node, ports = ?e.count, "dispose requested");
            }
            EventKind::DisposeCompleted => {
                info!(target: "nodevisor::events", node, stops = ?e.count, ?reason, "dispose completed");
            }
            EventKind::SubscriberOverflow => {
                warn!(target: "nodevisor::events", subscriber = ?e.subscriber, ?reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                error!(target: "nodevisor::events", subscriber = ?e.subscriber, ?reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }

    fn accepts(&self, kind: EventKind) -> bool {
        kind != EventKind::LookupFailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_failures_are_left_to_the_probe() {
        let writer = LogWriter::new();
        assert!(!writer.accepts(EventKind::LookupFailed));
        assert!(writer.accepts(EventKind::KillFailed));
        assert!(writer.accepts(EventKind::DisposeCompleted));
    }
}
