//! Supervisor core: registry, per-port gates and orchestration.
//!
//! The public API from this module is [`NodeSupervisor`] (built with
//! [`SupervisorBuilder`]) and the snapshot types it hands out.
//!
//! Internal modules:
//! - [`supervisor`]: start/stop/dispose/shutdown and exit reconciliation;
//! - [`builder`]: wires collaborators and background tasks;
//! - [`registry`]: the `PortKey → ProcessHandle` table;
//! - [`slot`]: per-port gates serializing operations on one port;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod builder;
mod registry;
mod shutdown;
mod slot;
mod supervisor;

#[cfg(test)]
mod tests;

pub use builder::SupervisorBuilder;
pub use registry::{NodeHandle, Ownership};
pub use shutdown::wait_for_shutdown_signal;
pub use supervisor::{DisposeReport, NodeState, NodeSupervisor};
