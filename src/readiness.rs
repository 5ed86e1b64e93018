//! # Readiness waiting after spawn.
//!
//! [`ReadinessWaiter`] polls a [`LivenessProbe`] until a freshly spawned node
//! answers or the attempt budget is spent. The loop is explicit and bounded:
//!
//! ```text
//! for attempt in 1..=max_attempts {
//!   ├─► probe(port) (bounded by probe timeout)
//!   │     └─ Ok ──► return Ok(attempt)
//!   ├─► attempt == max_attempts ──► break
//!   ├─► publish ReadinessProbeFailed { attempt, delay }
//!   └─► sleep(backoff.next(attempt - 1)) (cancellable)
//! }
//! return Err(StartupTimeout)
//! ```
//!
//! The budget is attempt-count based. [`ReadinessWaiter::wait_until_ready_within`]
//! adds a wall-clock deadline on top; both honor the cancellation token.

use std::sync::Arc;
use std::time::Duration;

use tokio::select;
use tokio_util::sync::CancellationToken;

use crate::error::SupervisorError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::BackoffPolicy;
use crate::port::PortKey;
use crate::probe::liveness::bounded;
use crate::probe::LivenessProbe;

/// Bounded-retry liveness poller.
#[derive(Clone)]
pub struct ReadinessWaiter {
    liveness: Arc<dyn LivenessProbe>,
    backoff: BackoffPolicy,
    probe_timeout: Duration,
    bus: Bus,
    node: Arc<str>,
}

impl ReadinessWaiter {
    /// Creates a waiter spacing probes per `backoff`.
    pub fn new(
        liveness: Arc<dyn LivenessProbe>,
        backoff: BackoffPolicy,
        probe_timeout: Duration,
        bus: Bus,
        node: Arc<str>,
    ) -> Self {
        Self {
            liveness,
            backoff,
            probe_timeout,
            bus,
            node,
        }
    }

    /// Probes up to `max_attempts` times; returns the attempt that succeeded.
    ///
    /// # Errors
    /// - [`SupervisorError::StartupTimeout`] when every attempt failed
    /// - [`SupervisorError::Cancelled`] when `cancel` fired first
    pub async fn wait_until_ready(
        &self,
        port: PortKey,
        max_attempts: u32,
        cancel: &CancellationToken,
    ) -> Result<u32, SupervisorError> {
        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(SupervisorError::Cancelled { port });
            }
            let ok = select! {
                ok = self.probe_once(port) => ok,
                _ = cancel.cancelled() => return Err(SupervisorError::Cancelled { port }),
            };
            if ok {
                return Ok(attempt);
            }

            let mut failed = Event::new(EventKind::ReadinessProbeFailed)
                .with_node(self.node.clone())
                .with_port(port)
                .with_attempt(attempt);
            if attempt == max_attempts {
                self.bus.publish(failed);
                break;
            }

            let delay = self.backoff.next(attempt - 1);
            failed = failed.with_delay(delay);
            self.bus.publish(failed);

            select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(SupervisorError::Cancelled { port }),
            }
        }

        Err(SupervisorError::StartupTimeout {
            port,
            attempts: max_attempts,
        })
    }

    /// Like [`wait_until_ready`](Self::wait_until_ready), additionally bounded by `deadline`.
    ///
    /// Deadline expiry is reported as [`SupervisorError::StartupTimeout`] with the
    /// number of attempts started so far.
    pub async fn wait_until_ready_within(
        &self,
        port: PortKey,
        max_attempts: u32,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<u32, SupervisorError> {
        let started = tokio::time::Instant::now();
        match tokio::time::timeout(deadline, self.wait_until_ready(port, max_attempts, cancel)).await {
            Ok(res) => res,
            Err(_elapsed) => Err(SupervisorError::StartupTimeout {
                port,
                attempts: self.attempts_started_within(started.elapsed(), max_attempts),
            }),
        }
    }

    async fn probe_once(&self, port: PortKey) -> bool {
        bounded(self.liveness.as_ref(), port, self.probe_timeout)
            .await
            .is_ok()
    }

    /// Number of attempts that would have started within `elapsed`, ignoring probe latency.
    fn attempts_started_within(&self, elapsed: Duration, max_attempts: u32) -> u32 {
        let mut spent = Duration::ZERO;
        let mut started = 0;
        while started < max_attempts && spent <= elapsed {
            spent += self.backoff.next(started);
            started += 1;
        }
        started.max(1)
    }
}
