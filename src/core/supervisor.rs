//! # NodeSupervisor: start, attach, stop and reconcile local nodes of one kind.
//!
//! The [`NodeSupervisor`] owns the process registry, the per-port gates, the
//! event bus and its [`SubscriberSet`]. Collaborators (OS lookup, liveness
//! probe, spawner, killer, output channels) are injected through the
//! [`SupervisorBuilder`](crate::SupervisorBuilder).
//!
//! ## start(port, options)
//! ```text
//! into_port_key(port) ── Err ──► StartFailed(invalid_port), return
//! acquire gate(port), mark Starting
//!   ├─ registry holds a live Owned entry ──► return it
//!   └─ classify(port)
//!        ├─ Foreign   ──► PortBusy
//!        ├─ OwnedKind ──► register Attached, NodeAttached
//!        └─ Free      ──► spawn ──► OutputSink ──► NodeSpawned
//!                           select! {
//!                             wait_until_ready(port, max_attempts) ─ Ok ──► resolve pid,
//!                             │                                             register Owned,
//!                             │                                             arm exit watcher, NodeReady
//!                             └─ Err / child exit / cancel ──► kill, dispose sink, no entry
//!                           }
//! ```
//!
//! ## stop(port, kill_out_of_band)
//! ```text
//! acquire gate(port) ──► registry.take(port) ── None ──► Ok (no-op)
//!   ├─ Owned    ──► interrupt child, dispose sink           ──► NodeStopped(owned)
//!   └─ Attached ──► kill_pid(pid) if kill_out_of_band
//!                     ├─ Ok  ──► NodeStopped(attached)
//!                     └─ Err ──► KillFailed (entry already gone)
//! ```
//!
//! ## Exit reconciliation
//! ```text
//! child exits ──► watcher ──► mpsc ProcessExited{port, generation, code} ──► reconciler
//!                                          └─► gate(port) ──► take if generation matches ──► NodeExited
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tokio::select;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::SupervisorConfig;
use crate::core::registry::{NodeHandle, OwnedProcess, Ownership, ProcessHandle, ProcessRegistry};
use crate::core::shutdown;
use crate::core::slot::{PortSlots, SlotStatus};
use crate::error::SupervisorError;
use crate::events::{Bus, Event, EventKind};
use crate::kind::{NodeKind, StartOptions};
use crate::output::{channel_name, ChannelFactory, OutputSink};
use crate::port::{IntoPortKey, PortKey};
use crate::probe::{PortOwnershipProbe, PortStatus};
use crate::process::{ChildControl, ExitCode, ProcessKiller, SpawnedChild, Spawner};
use crate::readiness::ReadinessWaiter;
use crate::subscribers::SubscriberSet;

/// Lifecycle state of a port, as seen by one supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Nothing registered.
    Absent,
    /// A `start()` is in progress.
    Starting,
    /// A handle is registered.
    Running(Ownership),
    /// A `stop()` is in progress.
    Stopping,
}

/// Outcome of [`NodeSupervisor::dispose_all`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DisposeReport {
    /// Number of stop attempts issued.
    pub attempted: usize,
    /// Ports whose stop failed, with the error.
    pub failures: Vec<(PortKey, SupervisorError)>,
}

impl DisposeReport {
    /// Returns true if every stop succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Exit notification sent by an owned child's watcher.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ProcessExited {
    pub(crate) port: PortKey,
    pub(crate) generation: u64,
    pub(crate) code: ExitCode,
}

/// Collaborators assembled by the builder.
pub(crate) struct Parts {
    pub(crate) cfg: SupervisorConfig,
    pub(crate) kind: Arc<dyn NodeKind>,
    pub(crate) bus: Bus,
    pub(crate) subs: Arc<SubscriberSet>,
    pub(crate) probe: PortOwnershipProbe,
    pub(crate) readiness: ReadinessWaiter,
    pub(crate) spawner: Arc<dyn Spawner>,
    pub(crate) killer: Arc<dyn ProcessKiller>,
    pub(crate) channels: Arc<dyn ChannelFactory>,
}

/// Supervises local nodes of one [`NodeKind`], one per port.
pub struct NodeSupervisor {
    cfg: SupervisorConfig,
    kind: Arc<dyn NodeKind>,
    node: Arc<str>,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    probe: PortOwnershipProbe,
    readiness: ReadinessWaiter,
    spawner: Arc<dyn Spawner>,
    killer: Arc<dyn ProcessKiller>,
    channels: Arc<dyn ChannelFactory>,

    registry: ProcessRegistry,
    slots: PortSlots,
    generation: AtomicU64,
    exits: mpsc::UnboundedSender<ProcessExited>,

    /// Cancelled on drop; parent of the tokens below.
    runtime_token: CancellationToken,
    /// Cancelled by `shutdown()`: aborts in-flight readiness waits and refuses new starts.
    starts_token: CancellationToken,
    /// Cancelled at the end of `shutdown()`.
    reconciler_token: CancellationToken,
}

impl NodeSupervisor {
    pub(crate) fn new_internal(parts: Parts, exits: mpsc::UnboundedSender<ProcessExited>) -> Self {
        let runtime_token = CancellationToken::new();
        let node: Arc<str> = Arc::from(parts.kind.name());
        Self {
            cfg: parts.cfg,
            kind: parts.kind,
            node,
            bus: parts.bus,
            subs: parts.subs,
            probe: parts.probe,
            readiness: parts.readiness,
            spawner: parts.spawner,
            killer: parts.killer,
            channels: parts.channels,
            registry: ProcessRegistry::new(),
            slots: PortSlots::new(),
            generation: AtomicU64::new(1),
            exits,
            starts_token: runtime_token.child_token(),
            reconciler_token: runtime_token.child_token(),
            runtime_token,
        }
    }

    /// Starts (or attaches to) a node on `port`.
    ///
    /// Idempotent: a node of this kind already answering on the port is
    /// attached instead of spawned, and a node this supervisor already owns is
    /// returned as is.
    ///
    /// # Errors
    /// - [`SupervisorError::InvalidPort`] before any probe or spawn
    /// - [`SupervisorError::PortBusy`] when a foreign process holds the port
    /// - [`SupervisorError::ProcessSpawnFailure`] when the child cannot start or exits early
    /// - [`SupervisorError::StartupTimeout`] when the readiness budget is spent
    /// - [`SupervisorError::Cancelled`] when [`shutdown`](Self::shutdown) interrupts the start
    pub async fn start(
        &self,
        port: impl IntoPortKey,
        options: &StartOptions,
    ) -> Result<NodeHandle, SupervisorError> {
        let port = match port.into_port_key() {
            Ok(port) => port,
            Err(e) => {
                self.publish_start_failed(None, &e);
                return Err(e);
            }
        };
        self.bus
            .publish(self.event(EventKind::StartRequested).with_port(port));

        let slot = self.slots.acquire(port).await;
        slot.mark(SlotStatus::Starting);
        let res = self.start_locked(port, options).await;
        drop(slot);

        if let Err(e) = &res {
            self.publish_start_failed(Some(port), e);
        }
        res
    }

    async fn start_locked(
        &self,
        port: PortKey,
        options: &StartOptions,
    ) -> Result<NodeHandle, SupervisorError> {
        if self.starts_token.is_cancelled() {
            return Err(SupervisorError::Cancelled { port });
        }

        if let Some(mut stale) = self.registry.take_stale(port).await {
            debug!(node = %self.node, %port, "discarding owned handle whose child is gone");
            stale.release();
        }
        if let Some(existing) = self.registry.snapshot(port).await {
            if existing.ownership == Ownership::Owned {
                return Ok(existing);
            }
        }

        match self.probe.classify(port).await {
            PortStatus::Foreign { pid } => {
                self.discard(port).await;
                Err(SupervisorError::PortBusy {
                    port,
                    pid: Some(pid),
                })
            }
            PortStatus::OwnedKind { pid } => Ok(self.attach(port, pid).await),
            PortStatus::Free => {
                self.discard(port).await;
                self.spawn_and_wait(port, options).await
            }
        }
    }

    async fn attach(&self, port: PortKey, pid: u32) -> NodeHandle {
        let handle =
            ProcessHandle::attached(port, Some(pid), self.next_generation(), self.cfg.node_url(port));
        let snapshot = handle.snapshot();
        if let Some(mut previous) = self.registry.insert(handle).await {
            previous.release();
        }
        self.bus.publish(
            self.event(EventKind::NodeAttached)
                .with_port(port)
                .with_pid(Some(pid)),
        );
        snapshot
    }

    async fn spawn_and_wait(
        &self,
        port: PortKey,
        options: &StartOptions,
    ) -> Result<NodeHandle, SupervisorError> {
        let command = self.kind.command(port, options);
        debug!(node = %self.node, %port, command = %command.display(), "spawning node");

        let SpawnedChild {
            pid: child_pid,
            stdout,
            stderr,
            control,
            mut exited,
        } = self
            .spawner
            .spawn(&command)
            .map_err(|e| SupervisorError::ProcessSpawnFailure {
                port,
                reason: e.to_string(),
            })?;

        let child = KillOnDrop::new(control);
        let channel = self
            .channels
            .open(&channel_name(self.kind.display_name(), port));
        let output = OutputSink::attach(port, stdout, stderr, channel);
        self.bus.publish(
            self.event(EventKind::NodeSpawned)
                .with_port(port)
                .with_pid(child_pid),
        );

        let cancel = self.starts_token.child_token();
        let waited = select! {
            ready = self.readiness.wait_until_ready(port, self.cfg.readiness.max_attempts, &cancel) => ready,
            code = &mut exited => Err(SupervisorError::ProcessSpawnFailure {
                port,
                reason: format!("process {} before becoming ready", exit_description(code.ok().flatten())),
            }),
        };

        let attempt = match waited {
            Ok(attempt) => attempt,
            Err(e) => {
                // Dropping the guard force-kills the child; dropping the sink disposes it.
                drop(child);
                drop(output);
                self.discard(port).await;
                return Err(e);
            }
        };

        let pid = self.probe.resolve_pid(port).await.or(child_pid);
        let generation = self.next_generation();
        let process = OwnedProcess {
            control: child.defuse(),
            watcher: self.spawn_exit_watcher(port, generation, exited),
        };
        let handle =
            ProcessHandle::owned(port, pid, process, output, generation, self.cfg.node_url(port));
        let snapshot = handle.snapshot();
        if let Some(mut previous) = self.registry.insert(handle).await {
            previous.release();
        }

        self.bus.publish(
            self.event(EventKind::NodeReady)
                .with_port(port)
                .with_pid(pid)
                .with_attempt(attempt),
        );
        Ok(snapshot)
    }

    /// Stops whatever this supervisor has registered on `port`.
    ///
    /// The entry leaves the registry before any teardown I/O. Owned children
    /// are interrupted; attached processes are killed by pid only when
    /// `kill_out_of_band` is set. Stopping an empty port is a no-op.
    ///
    /// # Errors
    /// - [`SupervisorError::InvalidPort`]
    /// - [`SupervisorError::KillFailed`] when the out-of-band kill fails
    pub async fn stop(
        &self,
        port: impl IntoPortKey,
        kill_out_of_band: bool,
    ) -> Result<(), SupervisorError> {
        let port = port.into_port_key()?;
        let slot = self.slots.acquire(port).await;

        let Some(handle) = self.registry.take(port).await else {
            debug!(node = %self.node, %port, "stop: nothing registered");
            return Ok(());
        };
        slot.mark(SlotStatus::Stopping);
        self.bus.publish(
            self.event(EventKind::StopRequested)
                .with_port(port)
                .with_pid(handle.pid),
        );
        self.teardown(handle, kill_out_of_band).await
    }

    async fn teardown(
        &self,
        mut handle: ProcessHandle,
        kill_out_of_band: bool,
    ) -> Result<(), SupervisorError> {
        let port = handle.port;
        let pid = handle.pid;

        if let Some(process) = handle.process.take() {
            if let Some(output) = handle.output.as_mut() {
                output.dispose();
            }
            if !process.control.interrupt() {
                debug!(node = %self.node, %port, "child already gone");
            }
            // The driver task keeps reaping the child; its exit is no longer reconciled.
            process.watcher.abort();
            self.publish_stopped(port, pid, "owned");
            return Ok(());
        }

        let Some(pid) = pid.filter(|_| kill_out_of_band) else {
            self.publish_stopped(port, pid, "attached_kept");
            return Ok(());
        };

        match self.killer.kill_pid(pid).await {
            Ok(()) => {
                self.publish_stopped(port, Some(pid), "attached");
                Ok(())
            }
            Err(e) => {
                let err = SupervisorError::KillFailed {
                    port,
                    pid,
                    reason: e.to_string(),
                };
                debug!(node = %self.node, %port, pid, error = %e, "out-of-band kill failed");
                self.bus.publish(
                    self.event(EventKind::KillFailed)
                        .with_port(port)
                        .with_pid(Some(pid))
                        .with_reason(e.to_string()),
                );
                Err(err)
            }
        }
    }

    /// Stops every registered port without out-of-band kills.
    ///
    /// Operations holding a port gate (a start waiting for readiness, for
    /// instance) are waited for, so whatever they register is stopped too.
    /// Per-port failures are logged and collected; the registry is empty on return.
    pub async fn dispose_all(&self) -> DisposeReport {
        let mut report = DisposeReport::default();
        self.bus.publish(
            self.event(EventKind::DisposeRequested)
                .with_count(count(self.registry.len().await)),
        );

        loop {
            let ports = self.registry.ports().await;
            if ports.is_empty() {
                let busy = self.slots.busy_ports();
                if busy.is_empty() {
                    break;
                }
                for port in busy {
                    debug!(node = %self.node, %port, "dispose: waiting for port operation");
                    drop(self.slots.acquire(port).await);
                }
                continue;
            }
            for port in ports {
                report.attempted += 1;
                if let Err(e) = self.stop(port, false).await {
                    warn!(node = %self.node, %port, error = %e, "dispose: stop failed");
                    report.failures.push((port, e));
                }
            }
        }

        let mut done = self
            .event(EventKind::DisposeCompleted)
            .with_count(count(report.attempted));
        if !report.is_clean() {
            done = done.with_reason(format!("failures={}", report.failures.len()));
        }
        self.bus.publish(done);
        report
    }

    /// Cancels in-flight starts, disposes every node and stops exit reconciliation.
    ///
    /// Starts issued afterwards fail with [`SupervisorError::Cancelled`].
    pub async fn shutdown(&self) -> DisposeReport {
        self.starts_token.cancel();
        let report = self.dispose_all().await;
        self.reconciler_token.cancel();
        report
    }

    /// Waits for a termination signal (or a concurrent [`shutdown`](Self::shutdown)),
    /// then shuts down.
    ///
    /// # Errors
    /// Fails only if signal handlers cannot be installed.
    pub async fn run_until_signal(&self) -> std::io::Result<DisposeReport> {
        select! {
            res = shutdown::wait_for_shutdown_signal() => res?,
            _ = self.starts_token.cancelled() => {}
        }
        Ok(self.shutdown().await)
    }

    /// Current lifecycle state of `port`.
    pub async fn state(&self, port: impl IntoPortKey) -> Result<NodeState, SupervisorError> {
        let port = port.into_port_key()?;
        Ok(match self.slots.status(port) {
            SlotStatus::Starting => NodeState::Starting,
            SlotStatus::Stopping => NodeState::Stopping,
            SlotStatus::Idle => match self.registry.snapshot(port).await {
                Some(handle) => NodeState::Running(handle.ownership),
                None => NodeState::Absent,
            },
        })
    }

    /// Snapshot of the handle registered on `port`.
    pub async fn handle(&self, port: impl IntoPortKey) -> Result<Option<NodeHandle>, SupervisorError> {
        let port = port.into_port_key()?;
        Ok(self.registry.snapshot(port).await)
    }

    /// Sorted list of registered ports.
    pub async fn ports(&self) -> Vec<PortKey> {
        self.registry.ports().await
    }

    /// Subscribes to lifecycle events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// The supervised node kind.
    pub fn kind(&self) -> &dyn NodeKind {
        self.kind.as_ref()
    }

    /// Effective configuration.
    pub fn config(&self) -> &SupervisorConfig {
        &self.cfg
    }

    // ---------------------------
    // Background tasks
    // ---------------------------

    /// Subscribes to the bus and forwards events to the subscriber set (fire-and-forget).
    pub(crate) fn subscriber_listener(&self) {
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        let token = self.runtime_token.clone();
        tokio::spawn(async move {
            loop {
                select! {
                    _ = token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(ev) => set.emit(&ev),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "subscriber listener lagged behind the bus");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        });
    }

    /// Applies exit notifications until shut down.
    pub(crate) fn spawn_reconciler(self: &Arc<Self>, mut rx: mpsc::UnboundedReceiver<ProcessExited>) {
        let me: Weak<Self> = Arc::downgrade(self);
        let token = self.reconciler_token.clone();
        tokio::spawn(async move {
            loop {
                let exit = select! {
                    _ = token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Some(exit) => exit,
                        None => break,
                    },
                };
                let Some(sup) = me.upgrade() else { break };
                // Per-exit task: a start holding another port's gate must not delay this one.
                tokio::spawn(async move { sup.reconcile(exit).await });
            }
        });
    }

    async fn reconcile(&self, exit: ProcessExited) {
        let _slot = self.slots.acquire(exit.port).await;
        let Some(mut handle) = self
            .registry
            .take_generation(exit.port, exit.generation)
            .await
        else {
            return;
        };
        handle.release();

        let description = exit_description(exit.code);
        debug!(node = %self.node, port = %exit.port, pid = ?handle.pid, %description, "node process exited");
        self.bus.publish(
            self.event(EventKind::NodeExited)
                .with_port(exit.port)
                .with_pid(handle.pid)
                .with_reason(description),
        );
    }

    fn spawn_exit_watcher(
        &self,
        port: PortKey,
        generation: u64,
        exited: oneshot::Receiver<ExitCode>,
    ) -> JoinHandle<()> {
        let tx = self.exits.clone();
        tokio::spawn(async move {
            let code = exited.await.unwrap_or(None);
            let _ = tx.send(ProcessExited {
                port,
                generation,
                code,
            });
        })
    }

    // ---------------------------
    // Helpers
    // ---------------------------

    async fn discard(&self, port: PortKey) {
        if let Some(mut handle) = self.registry.take(port).await {
            debug!(node = %self.node, %port, "discarding stale handle");
            handle.release();
        }
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed)
    }

    fn event(&self, kind: EventKind) -> Event {
        Event::new(kind).with_node(self.node.clone())
    }

    fn publish_start_failed(&self, port: Option<PortKey>, err: &SupervisorError) {
        let mut ev = self.event(EventKind::StartFailed).with_reason(err.as_label());
        if let Some(port) = port {
            ev = ev.with_port(port);
        }
        self.bus.publish(ev);
    }

    fn publish_stopped(&self, port: PortKey, pid: Option<u32>, how: &'static str) {
        self.bus.publish(
            self.event(EventKind::NodeStopped)
                .with_port(port)
                .with_pid(pid)
                .with_reason(how),
        );
    }
}

impl Drop for NodeSupervisor {
    fn drop(&mut self) {
        self.runtime_token.cancel();
    }
}

/// Kills a partially started child unless defused.
struct KillOnDrop {
    control: ChildControl,
    armed: bool,
}

impl KillOnDrop {
    fn new(control: ChildControl) -> Self {
        Self {
            control,
            armed: true,
        }
    }

    fn defuse(mut self) -> ChildControl {
        self.armed = false;
        self.control.clone()
    }
}

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.control.kill();
        }
    }
}

fn exit_description(code: ExitCode) -> String {
    match code {
        Some(code) => format!("exited with code {code}"),
        None => "terminated by signal".to_string(),
    }
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
