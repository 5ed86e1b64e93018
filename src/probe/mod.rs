//! # Port ownership probing.
//!
//! [`PortOwnershipProbe::classify`] decides, for one port, between three states:
//!
//! ```text
//! PortLookup::find_listener(port)
//!   ├─ Ok(None)        ──────────────────────────────► Free
//!   ├─ Err(lookup)     ── warn + LookupFailed ───────► Free
//!   └─ Ok(Some(pid))   ── LivenessProbe::probe(port)
//!                            ├─ Ok              ─────► OwnedKind { pid }
//!                            └─ Err / timeout   ─────► Foreign { pid }
//! ```
//!
//! The result is computed fresh on every call; nothing is cached.

pub mod liveness;
pub mod lookup;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::events::{Bus, Event, EventKind};
use crate::port::PortKey;

pub use liveness::{
    HttpGetProbe, JsonRpcProbe, LivenessProbe, ProbeFailure, ProbeSettings, RpcExpectation,
};
pub use lookup::{OsPortLookup, PortLookup};

/// Who, if anyone, holds a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortStatus {
    /// No listener found (or the lookup tool failed).
    Free,
    /// A listener answers our kind's liveness probe.
    OwnedKind {
        /// Listening process.
        pid: u32,
    },
    /// A listener exists but is not our kind of node.
    Foreign {
        /// Listening process.
        pid: u32,
    },
}

impl PortStatus {
    /// Returns the listener pid, if any.
    pub fn pid(&self) -> Option<u32> {
        match self {
            PortStatus::Free => None,
            PortStatus::OwnedKind { pid } | PortStatus::Foreign { pid } => Some(*pid),
        }
    }
}

/// Classifies ports by combining an OS lookup with a liveness probe.
#[derive(Clone)]
pub struct PortOwnershipProbe {
    lookup: Arc<dyn PortLookup>,
    liveness: Arc<dyn LivenessProbe>,
    timeout: Duration,
    bus: Bus,
    node: Arc<str>,
}

impl PortOwnershipProbe {
    /// Creates a probe; `timeout` bounds each liveness probe.
    pub fn new(
        lookup: Arc<dyn PortLookup>,
        liveness: Arc<dyn LivenessProbe>,
        timeout: Duration,
        bus: Bus,
        node: Arc<str>,
    ) -> Self {
        Self {
            lookup,
            liveness,
            timeout,
            bus,
            node,
        }
    }

    /// Derives the current [`PortStatus`] of `port`. Never fails.
    pub async fn classify(&self, port: PortKey) -> PortStatus {
        let Some(pid) = self.resolve_pid(port).await else {
            return PortStatus::Free;
        };

        if self.is_alive(port).await {
            PortStatus::OwnedKind { pid }
        } else {
            PortStatus::Foreign { pid }
        }
    }

    /// Runs the OS lookup, downgrading tool failures to "not found".
    pub async fn resolve_pid(&self, port: PortKey) -> Option<u32> {
        match self.lookup.find_listener(port).await {
            Ok(pid) => pid,
            Err(e) => {
                warn!(node = %self.node, %port, error = %e, "port lookup failed; treating port as free");
                self.bus.publish(
                    Event::new(EventKind::LookupFailed)
                        .with_node(self.node.clone())
                        .with_port(port)
                        .with_reason(e.to_string()),
                );
                None
            }
        }
    }

    /// One bounded liveness probe.
    pub async fn is_alive(&self, port: PortKey) -> bool {
        match liveness::bounded(self.liveness.as_ref(), port, self.timeout).await {
            Ok(()) => true,
            Err(failure) => {
                debug!(node = %self.node, %port, %failure, "liveness probe failed");
                false
            }
        }
    }
}
