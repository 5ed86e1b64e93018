//! # nodevisor
//!
//! **Nodevisor** supervises local blockchain development nodes (Ganache, Truffle
//! Dashboard, or any JSON-RPC speaking binary) for editor and tooling
//! integrations.
//!
//! For one node kind it starts a node per port (or attaches to one that is
//! already running), waits until it answers its liveness probe, captures its
//! output, and guarantees that everything it spawned is gone after shutdown.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   start(port) / stop(port) / dispose_all() / shutdown()
//!                 │
//!                 ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  NodeSupervisor (one per node kind)                               │
//! │  - PortSlots (per-port gates)                                     │
//! │  - ProcessRegistry (PortKey → ProcessHandle)                      │
//! │  - Bus + SubscriberSet (lifecycle events)                         │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               ▼
//! ┌──────────────┐  ┌────────────────┐  ┌──────────────┐  ┌──────────────┐
//! │ PortOwnership│  │ ReadinessWaiter│  │   Spawner    │  │ ProcessKiller│
//! │    Probe     │  │ (probe+backoff)│  │ (OS process) │  │ (pid, forced)│
//! │ lookup+probe │  └────────────────┘  └──────┬───────┘  └──────────────┘
//! └──────────────┘                             ▼
//!                                      ┌──────────────┐
//!                                      │  OutputSink  │──► OutputChannel
//!                                      │ stdout/stderr│    ("Ganache:8545")
//!                                      └──────────────┘
//!
//! Events ──► Bus (broadcast) ──► subscriber_listener ──► SubscriberSet
//!                                                  ┌─────────┼─────────┐
//!                                                  ▼         ▼         ▼
//!                                              LogWriter  Telemetry  Custom
//! ```
//!
//! ### Start lifecycle
//! ```text
//! start(port)
//!   ├─ invalid port          ──► InvalidPort (no probe, no spawn)
//!   ├─ classify(port)
//!   │    ├─ Foreign          ──► PortBusy
//!   │    ├─ OwnedKind        ──► Attached handle (not spawned, not killed on dispose)
//!   │    └─ Free             ──► spawn ──► wait_until_ready
//!   │                               ├─ ready      ──► Owned handle
//!   │                               └─ exhausted  ──► kill child ──► StartupTimeout
//!   └─ every path publishes events on the Bus
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Supervision**   | Start, attach, stop and dispose nodes keyed by port.         | [`NodeSupervisor`], [`SupervisorBuilder`]   |
//! | **Node kinds**    | Command line and liveness probe of each node type.           | [`NodeKind`], [`Ganache`], [`Dashboard`], [`Generic`] |
//! | **Probing**       | Who holds a port, and is it our kind of node.                | [`PortOwnershipProbe`], [`PortStatus`]      |
//! | **Readiness**     | Bounded probe loop after spawn.                              | [`ReadinessWaiter`], [`BackoffPolicy`]      |
//! | **Output**        | Per-node stdout/stderr capture into named channels.          | [`OutputSink`], [`ChannelFactory`]          |
//! | **Subscriber API**| Hook into lifecycle events (logging, telemetry, custom).      | [`Subscribe`], [`TelemetryBridge`]          |
//! | **Errors**        | Typed errors for every failing operation.                    | [`SupervisorError`]                         |
//! | **Configuration** | Centralized runtime settings, loadable from TOML.            | [`SupervisorConfig`]                        |
//!
//! ## Optional features
//! - `logging` (default): exports the built-in [`LogWriter`] subscriber.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use nodevisor::{Ganache, NodeSupervisor, StartOptions, SupervisorConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn nodevisor::Subscribe>> = vec![Arc::new(nodevisor::LogWriter::new())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn nodevisor::Subscribe>> = Vec::new();
//!
//!     let sup = NodeSupervisor::builder(SupervisorConfig::default(), Arc::new(Ganache))
//!         .with_subscribers(subs)
//!         .build();
//!
//!     let node = sup.start(8545u16, &StartOptions::default()).await?;
//!     println!("{} is {:?} at {}", node.port, node.ownership, node.url);
//!
//!     // Blocks until SIGINT/SIGTERM, then stops everything this supervisor owns.
//!     let report = sup.run_until_signal().await?;
//!     assert!(report.is_clean());
//!     Ok(())
//! }
//! ```
mod config;
mod core;
mod error;
mod events;
mod kind;
mod output;
mod policies;
mod port;
mod probe;
mod process;
mod readiness;
mod subscribers;

// ---- Public re-exports ----

pub use config::{ReadinessConfig, SupervisorConfig};
pub use core::{
    wait_for_shutdown_signal, DisposeReport, NodeHandle, NodeState, NodeSupervisor, Ownership,
    SupervisorBuilder,
};
pub use error::{ConfigError, KillError, LookupError, SpawnError, SupervisorError};
pub use events::{Bus, Event, EventKind};
pub use kind::{fork_flags, Dashboard, ForkOptions, Ganache, Generic, NodeKind, StartOptions};
pub use output::{
    channel_name, ChannelFactory, MemoryChannel, MemoryChannels, OutputChannel, OutputSink,
    OutputStream, StreamKind, TracingChannels,
};
pub use policies::BackoffPolicy;
pub use port::{IntoPortKey, PortKey};
pub use probe::{
    HttpGetProbe, JsonRpcProbe, LivenessProbe, OsPortLookup, PortLookup, PortOwnershipProbe,
    PortStatus, ProbeFailure, ProbeSettings, RpcExpectation,
};
pub use process::{
    ChildControl, ExitCode, OsProcessKiller, ProcessKiller, ProcessSignal, SpawnCommand,
    SpawnedChild, Spawner, TokioSpawner,
};
pub use readiness::ReadinessWaiter;
pub use subscribers::{Subscribe, SubscriberSet, Telemetry, TelemetryBridge, TelemetryProps};

// Optional: built-in subscriber rendering events through `tracing`.
// Enabled by default through the `logging` feature.
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
