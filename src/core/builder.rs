//! # Supervisor assembly.
//!
//! [`SupervisorBuilder`] wires a node kind, its collaborators and subscribers
//! into a running [`NodeSupervisor`]. Collaborators left unset get their
//! OS-backed defaults.
//!
//! ```rust
//! use std::sync::Arc;
//! use nodevisor::{Dashboard, MemoryChannels, NodeSupervisor, SupervisorConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let channels = Arc::new(MemoryChannels::new());
//!     let sup = NodeSupervisor::builder(SupervisorConfig::default(), Arc::new(Dashboard))
//!         .with_channels(channels)
//!         .build();
//!
//!     assert!(sup.ports().await.is_empty());
//!     assert!(sup.shutdown().await.is_clean());
//! }
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::{
    config::SupervisorConfig,
    events::Bus,
    kind::NodeKind,
    output::{ChannelFactory, TracingChannels},
    probe::{LivenessProbe, OsPortLookup, PortLookup, PortOwnershipProbe},
    process::{OsProcessKiller, ProcessKiller, Spawner, TokioSpawner},
    readiness::ReadinessWaiter,
    subscribers::{Subscribe, SubscriberSet},
};
use super::supervisor::{NodeSupervisor, Parts};

/// Builder for constructing a [`NodeSupervisor`] with optional collaborators.
///
/// Every collaborator defaults to its OS-backed implementation:
///
/// | Collaborator   | Default                                     |
/// |----------------|---------------------------------------------|
/// | port lookup    | [`OsPortLookup`] (`netstat` / `lsof`)       |
/// | liveness probe | the kind's own probe                        |
/// | spawner        | [`TokioSpawner`] with `kill_grace`          |
/// | killer         | [`OsProcessKiller`]                         |
/// | channels       | [`TracingChannels`]                         |
pub struct SupervisorBuilder {
    cfg: SupervisorConfig,
    kind: Arc<dyn NodeKind>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    lookup: Option<Arc<dyn PortLookup>>,
    liveness: Option<Arc<dyn LivenessProbe>>,
    spawner: Option<Arc<dyn Spawner>>,
    killer: Option<Arc<dyn ProcessKiller>>,
    channels: Option<Arc<dyn ChannelFactory>>,
}

impl SupervisorBuilder {
    /// Creates a new builder for `kind` with the given configuration.
    pub fn new(cfg: SupervisorConfig, kind: Arc<dyn NodeKind>) -> Self {
        Self {
            cfg,
            kind,
            subscribers: Vec::new(),
            lookup: None,
            liveness: None,
            spawner: None,
            killer: None,
            channels: None,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive lifecycle events through dedicated workers with
    /// bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Replaces the OS port lookup.
    pub fn with_lookup(mut self, lookup: Arc<dyn PortLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Replaces the kind's liveness probe (used for both ownership and readiness).
    pub fn with_liveness(mut self, liveness: Arc<dyn LivenessProbe>) -> Self {
        self.liveness = Some(liveness);
        self
    }

    /// Replaces the spawn primitive.
    pub fn with_spawner(mut self, spawner: Arc<dyn Spawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Replaces the out-of-band killer.
    pub fn with_killer(mut self, killer: Arc<dyn ProcessKiller>) -> Self {
        self.killer = Some(killer);
        self
    }

    /// Replaces the output channel factory.
    pub fn with_channels(mut self, channels: Arc<dyn ChannelFactory>) -> Self {
        self.channels = Some(channels);
        self
    }

    /// Builds the supervisor and starts its background tasks:
    /// - subscriber workers and the bus listener feeding them
    /// - the exit reconciler
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Arc<NodeSupervisor> {
        let cfg = self.cfg;
        let kind = self.kind;
        let node: Arc<str> = Arc::from(kind.name());

        let bus = Bus::new(cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));

        let liveness = self
            .liveness
            .unwrap_or_else(|| kind.liveness(cfg.probe_settings()));
        let lookup = self
            .lookup
            .unwrap_or_else(|| Arc::new(OsPortLookup::new(cfg.probe_timeout)));
        let probe = PortOwnershipProbe::new(
            lookup,
            liveness.clone(),
            cfg.probe_timeout,
            bus.clone(),
            node.clone(),
        );
        let readiness = ReadinessWaiter::new(
            liveness,
            cfg.readiness.backoff(),
            cfg.probe_timeout,
            bus.clone(),
            node,
        );

        let spawner = self
            .spawner
            .unwrap_or_else(|| Arc::new(TokioSpawner::new(cfg.kill_grace())));
        let killer = self.killer.unwrap_or_else(|| Arc::new(OsProcessKiller));
        let channels = self.channels.unwrap_or_else(|| Arc::new(TracingChannels));

        let (exits_tx, exits_rx) = mpsc::unbounded_channel();
        let sup = Arc::new(NodeSupervisor::new_internal(
            Parts {
                cfg,
                kind,
                bus,
                subs,
                probe,
                readiness,
                spawner,
                killer,
                channels,
            },
            exits_tx,
        ));

        sup.subscriber_listener();
        sup.spawn_reconciler(exits_rx);
        sup
    }
}

impl NodeSupervisor {
    /// Starts building a supervisor for `kind`.
    pub fn builder(cfg: SupervisorConfig, kind: Arc<dyn NodeKind>) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg, kind)
    }
}
