//! Supervisor scenarios against scripted collaborators.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::error::{KillError, LookupError, SpawnError};
use crate::probe::{LivenessProbe, PortLookup, ProbeFailure};
use crate::process::{ChildControl, ExitCode, ProcessKiller, ProcessSignal, SpawnCommand, SpawnedChild, Spawner};
use crate::{
    Event, EventKind, ForkOptions, Ganache, MemoryChannels, NodeState, NodeSupervisor, Ownership,
    PortKey, StartOptions, SupervisorConfig, SupervisorError,
};

const PORT: u16 = 8545;

// ---------------------------
// Fakes
// ---------------------------

struct ScriptedLookup {
    script: Mutex<VecDeque<Option<u32>>>,
    fallback: Option<u32>,
    calls: AtomicUsize,
}

impl ScriptedLookup {
    fn new(script: impl IntoIterator<Item = Option<u32>>, fallback: Option<u32>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PortLookup for ScriptedLookup {
    async fn find_listener(&self, _port: PortKey) -> Result<Option<u32>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.script.lock().unwrap().pop_front().unwrap_or(self.fallback))
    }
}

struct ScriptedProbe {
    script: Mutex<VecDeque<bool>>,
    fallback: bool,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    fn new(script: impl IntoIterator<Item = bool>, fallback: bool) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl LivenessProbe for ScriptedProbe {
    async fn probe(&self, _port: PortKey) -> Result<(), ProbeFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.script.lock().unwrap().pop_front().unwrap_or(self.fallback) {
            Ok(())
        } else {
            Err(ProbeFailure::Transport("connection refused".into()))
        }
    }
}

struct FakeChild {
    signals: mpsc::UnboundedReceiver<ProcessSignal>,
    exit: Option<oneshot::Sender<ExitCode>>,
}

#[derive(Default)]
struct FakeSpawner {
    fail: bool,
    children: Mutex<Vec<FakeChild>>,
    commands: Mutex<Vec<SpawnCommand>>,
}

impl FakeSpawner {
    fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    fn spawn_count(&self) -> usize {
        self.children.lock().unwrap().len()
    }

    fn commands(&self) -> Vec<SpawnCommand> {
        self.commands.lock().unwrap().clone()
    }

    /// Signals received so far by child `i`.
    fn signals(&self, i: usize) -> Vec<ProcessSignal> {
        let mut children = self.children.lock().unwrap();
        let mut out = Vec::new();
        while let Ok(signal) = children[i].signals.try_recv() {
            out.push(signal);
        }
        out
    }

    /// Whether nothing waits on child `i`'s exit any more.
    async fn exit_unwatched(&self, i: usize) -> bool {
        let Some(mut tx) = self.children.lock().unwrap()[i].exit.take() else {
            return true;
        };
        tokio::time::timeout(Duration::from_secs(1), tx.closed())
            .await
            .is_ok()
    }

    /// Makes child `i` exit.
    fn exit(&self, i: usize, code: ExitCode) {
        let mut children = self.children.lock().unwrap();
        children[i].signals.close();
        if let Some(tx) = children[i].exit.take() {
            let _ = tx.send(code);
        }
    }
}

impl Spawner for FakeSpawner {
    fn spawn(&self, command: &SpawnCommand) -> Result<SpawnedChild, SpawnError> {
        if self.fail {
            return Err(SpawnError::Io {
                program: command.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            });
        }
        let (control, signals) = ChildControl::channel();
        let (tx, exited) = oneshot::channel();

        let mut children = self.children.lock().unwrap();
        let pid = 100 + children.len() as u32;
        children.push(FakeChild {
            signals,
            exit: Some(tx),
        });
        self.commands.lock().unwrap().push(command.clone());

        Ok(SpawnedChild {
            pid: Some(pid),
            stdout: Some(Box::new(Cursor::new(b"Listening on 127.0.0.1:8545\n".to_vec()))),
            stderr: None,
            control,
            exited,
        })
    }
}

#[derive(Default)]
struct FakeKiller {
    fail: bool,
    pids: Mutex<Vec<u32>>,
}

impl FakeKiller {
    fn pids(&self) -> Vec<u32> {
        self.pids.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessKiller for FakeKiller {
    async fn kill_pid(&self, pid: u32) -> Result<(), KillError> {
        self.pids.lock().unwrap().push(pid);
        if self.fail {
            Err(KillError::Signal {
                pid,
                reason: "EPERM".into(),
            })
        } else {
            Ok(())
        }
    }
}

struct Harness {
    sup: Arc<NodeSupervisor>,
    lookup: Arc<ScriptedLookup>,
    probe: Arc<ScriptedProbe>,
    spawner: Arc<FakeSpawner>,
    killer: Arc<FakeKiller>,
    channels: Arc<MemoryChannels>,
}

fn harness(lookup: Arc<ScriptedLookup>, probe: Arc<ScriptedProbe>) -> Harness {
    harness_with(lookup, probe, Arc::new(FakeSpawner::default()), Arc::new(FakeKiller::default()))
}

fn harness_with(
    lookup: Arc<ScriptedLookup>,
    probe: Arc<ScriptedProbe>,
    spawner: Arc<FakeSpawner>,
    killer: Arc<FakeKiller>,
) -> Harness {
    let channels = Arc::new(MemoryChannels::new());
    let sup = NodeSupervisor::builder(SupervisorConfig::default(), Arc::new(Ganache))
        .with_lookup(lookup.clone())
        .with_liveness(probe.clone())
        .with_spawner(spawner.clone())
        .with_killer(killer.clone())
        .with_channels(channels.clone())
        .build();
    Harness {
        sup,
        lookup,
        probe,
        spawner,
        killer,
        channels,
    }
}

fn port(p: u16) -> PortKey {
    PortKey::new(p).unwrap()
}

async fn next_of(rx: &mut broadcast::Receiver<Event>, kind: EventKind) -> Event {
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            let ev = rx.recv().await.unwrap();
            if ev.kind == kind {
                return ev;
            }
        }
    })
    .await
    .unwrap()
}

async fn wait_for_spawn(spawner: &FakeSpawner, n: usize) {
    while spawner.spawn_count() < n {
        tokio::task::yield_now().await;
    }
}

// ---------------------------
// Scenarios
// ---------------------------

#[tokio::test(start_paused = true)]
async fn free_port_spawns_and_becomes_owned() {
    let h = harness(
        ScriptedLookup::new([None, Some(4242)], None),
        ScriptedProbe::new([false, false, true], false),
    );
    let started = tokio::time::Instant::now();

    let handle = h.sup.start(PORT, &StartOptions::default()).await.unwrap();

    assert_eq!(handle.port, port(PORT));
    assert_eq!(handle.ownership, Ownership::Owned);
    assert_eq!(handle.pid, Some(4242));
    assert_eq!(handle.url, "http://127.0.0.1:8545");
    assert_eq!(h.spawner.spawn_count(), 1);
    assert_eq!(h.probe.calls.load(Ordering::SeqCst), 3);
    assert_eq!(started.elapsed(), Duration::from_secs(4));
    assert_eq!(
        h.sup.state(PORT).await.unwrap(),
        NodeState::Running(Ownership::Owned)
    );
    assert!(h.channels.channel("Ganache:8545").is_some());

    h.sup.stop(PORT, true).await.unwrap();

    assert_eq!(h.spawner.signals(0), vec![ProcessSignal::Interrupt]);
    assert!(h.channels.channel("Ganache:8545").unwrap().is_disposed());
    assert!(h.sup.handle(PORT).await.unwrap().is_none());
    assert_eq!(h.sup.state(PORT).await.unwrap(), NodeState::Absent);
    assert!(h.killer.pids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn running_node_of_our_kind_is_attached() {
    let h = harness(ScriptedLookup::new([], Some(999)), ScriptedProbe::new([], true));

    let handle = h.sup.start("8545", &StartOptions::default()).await.unwrap();

    assert_eq!(handle.ownership, Ownership::Attached);
    assert_eq!(handle.pid, Some(999));
    assert_eq!(h.spawner.spawn_count(), 0);

    let again = h.sup.start(PORT, &StartOptions::default()).await.unwrap();
    assert_eq!(again, handle);
    assert_eq!(h.spawner.spawn_count(), 0);

    h.sup.stop(PORT, true).await.unwrap();
    assert_eq!(h.killer.pids(), vec![999]);
    assert!(h.sup.ports().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn attached_node_is_kept_without_out_of_band_kill() {
    let h = harness(ScriptedLookup::new([], Some(999)), ScriptedProbe::new([], true));
    h.sup.start(PORT, &StartOptions::default()).await.unwrap();

    h.sup.stop(PORT, false).await.unwrap();

    assert!(h.killer.pids().is_empty());
    assert!(h.sup.handle(PORT).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn invalid_ports_are_rejected_before_any_probe() {
    let h = harness(ScriptedLookup::new([], None), ScriptedProbe::new([], true));
    let mut rx = h.sup.subscribe();

    let zero = h.sup.start(0u16, &StartOptions::default()).await.unwrap_err();
    let text = h.sup.start("abc", &StartOptions::default()).await.unwrap_err();

    assert_eq!(zero, SupervisorError::InvalidPort { input: "0".into() });
    assert_eq!(text, SupervisorError::InvalidPort { input: "abc".into() });
    assert_eq!(h.lookup.calls(), 0);
    assert_eq!(h.spawner.spawn_count(), 0);

    for _ in 0..2 {
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::StartFailed);
        assert_eq!(ev.reason.as_deref(), Some("invalid_port"));
        assert_eq!(ev.port, None);
    }
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn foreign_listener_is_port_busy() {
    let h = harness(ScriptedLookup::new([], Some(77)), ScriptedProbe::new([], false));

    let err = h.sup.start(PORT, &StartOptions::default()).await.unwrap_err();

    assert_eq!(
        err,
        SupervisorError::PortBusy {
            port: port(PORT),
            pid: Some(77)
        }
    );
    assert_eq!(h.spawner.spawn_count(), 0);
    assert!(h.sup.ports().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn readiness_exhaustion_kills_once_and_leaves_nothing() {
    let h = harness(ScriptedLookup::new([], None), ScriptedProbe::new([], false));
    let mut rx = h.sup.subscribe();
    let started = tokio::time::Instant::now();

    let err = h.sup.start(PORT, &StartOptions::default()).await.unwrap_err();

    assert_eq!(
        err,
        SupervisorError::StartupTimeout {
            port: port(PORT),
            attempts: 5
        }
    );
    assert_eq!(started.elapsed(), Duration::from_secs(8));
    assert_eq!(h.spawner.spawn_count(), 1);
    assert_eq!(h.spawner.signals(0), vec![ProcessSignal::Kill]);
    assert!(h.channels.channel("Ganache:8545").unwrap().is_disposed());
    assert!(h.sup.handle(PORT).await.unwrap().is_none());
    assert_eq!(h.sup.state(PORT).await.unwrap(), NodeState::Absent);

    let failed = next_of(&mut rx, EventKind::StartFailed).await;
    assert_eq!(failed.reason.as_deref(), Some("startup_timeout"));
}

#[tokio::test(start_paused = true)]
async fn spawn_failure_is_reported() {
    let h = harness_with(
        ScriptedLookup::new([], None),
        ScriptedProbe::new([], true),
        FakeSpawner::failing(),
        Arc::new(FakeKiller::default()),
    );

    let err = h.sup.start(PORT, &StartOptions::default()).await.unwrap_err();

    assert!(matches!(err, SupervisorError::ProcessSpawnFailure { .. }));
    assert!(h.sup.ports().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn child_exiting_before_ready_fails_the_start() {
    let h = harness(ScriptedLookup::new([], None), ScriptedProbe::new([], false));

    let start = {
        let sup = h.sup.clone();
        tokio::spawn(async move { sup.start(PORT, &StartOptions::default()).await })
    };
    wait_for_spawn(&h.spawner, 1).await;
    h.spawner.exit(0, Some(1));

    let err = start.await.unwrap().unwrap_err();
    match err {
        SupervisorError::ProcessSpawnFailure { reason, .. } => {
            assert!(reason.contains("exited with code 1"), "{reason}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(h.sup.ports().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn second_start_returns_owned_handle_without_respawning() {
    let h = harness(ScriptedLookup::new([None], Some(4242)), ScriptedProbe::new([true], true));

    let first = h.sup.start(PORT, &StartOptions::default()).await.unwrap();
    let second = h.sup.start(PORT, &StartOptions::default()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(h.spawner.spawn_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_starts_spawn_once() {
    let h = harness(
        ScriptedLookup::new([None], Some(4242)),
        ScriptedProbe::new([false, true], true),
    );

    let a = {
        let sup = h.sup.clone();
        tokio::spawn(async move { sup.start(PORT, &StartOptions::default()).await })
    };
    let b = {
        let sup = h.sup.clone();
        tokio::spawn(async move { sup.start(PORT, &StartOptions::default()).await })
    };

    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();
    assert_eq!(a, b);
    assert_eq!(a.ownership, Ownership::Owned);
    assert_eq!(h.spawner.spawn_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn unsolicited_exit_removes_entry() {
    let h = harness(ScriptedLookup::new([None], Some(4242)), ScriptedProbe::new([true], true));
    let mut rx = h.sup.subscribe();
    h.sup.start(PORT, &StartOptions::default()).await.unwrap();

    h.spawner.exit(0, Some(0));

    let exited = next_of(&mut rx, EventKind::NodeExited).await;
    assert_eq!(exited.port, Some(port(PORT)));
    assert_eq!(exited.pid, Some(4242));
    assert!(h.sup.handle(PORT).await.unwrap().is_none());
    assert!(h.channels.channel("Ganache:8545").unwrap().is_disposed());
}

#[tokio::test(start_paused = true)]
async fn stale_exit_does_not_remove_newer_handle() {
    let h = harness(ScriptedLookup::new([None, Some(1), None], Some(2)), ScriptedProbe::new([], true));

    h.sup.start(PORT, &StartOptions::default()).await.unwrap();
    h.sup.stop(PORT, true).await.unwrap();
    let second = h.sup.start(PORT, &StartOptions::default()).await.unwrap();
    assert_eq!(h.spawner.spawn_count(), 2);

    h.spawner.exit(0, None);
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert_eq!(h.sup.handle(PORT).await.unwrap(), Some(second));
}

#[tokio::test(start_paused = true)]
async fn stale_attached_entry_is_replaced_when_port_frees_up() {
    let h = harness(
        ScriptedLookup::new([Some(999), None], Some(4242)),
        ScriptedProbe::new([true], true),
    );

    let attached = h.sup.start(PORT, &StartOptions::default()).await.unwrap();
    assert_eq!(attached.ownership, Ownership::Attached);

    let owned = h.sup.start(PORT, &StartOptions::default()).await.unwrap();
    assert_eq!(owned.ownership, Ownership::Owned);
    assert_eq!(h.spawner.spawn_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn kill_failure_is_surfaced_after_removal() {
    let h = harness_with(
        ScriptedLookup::new([], Some(999)),
        ScriptedProbe::new([], true),
        Arc::new(FakeSpawner::default()),
        Arc::new(FakeKiller {
            fail: true,
            ..FakeKiller::default()
        }),
    );
    h.sup.start(PORT, &StartOptions::default()).await.unwrap();

    let err = h.sup.stop(PORT, true).await.unwrap_err();

    assert_eq!(err.as_label(), "kill_failed");
    assert!(matches!(err, SupervisorError::KillFailed { pid: 999, .. }));
    assert!(h.sup.handle(PORT).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn stop_on_empty_port_is_noop() {
    let h = harness(ScriptedLookup::new([], None), ScriptedProbe::new([], true));
    h.sup.stop(PORT, true).await.unwrap();
    assert!(matches!(
        h.sup.stop("70000", true).await,
        Err(SupervisorError::InvalidPort { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn dispose_all_stops_every_port() {
    let h = harness(ScriptedLookup::new([], Some(999)), ScriptedProbe::new([], true));
    for p in [7545u16, 8545, 9545] {
        h.sup.start(p, &StartOptions::default()).await.unwrap();
    }
    assert_eq!(h.sup.ports().await.len(), 3);

    let report = h.sup.dispose_all().await;

    assert_eq!(report.attempted, 3);
    assert!(report.is_clean());
    assert!(h.sup.ports().await.is_empty());
    assert!(h.killer.pids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_owned_and_keeps_attached() {
    let h = harness(
        ScriptedLookup::new([None, Some(4242), Some(999)], None),
        ScriptedProbe::new([], true),
    );
    let mut rx = h.sup.subscribe();
    let owned = h.sup.start(8545u16, &StartOptions::default()).await.unwrap();
    let attached = h.sup.start(7545u16, &StartOptions::default()).await.unwrap();
    assert_eq!(owned.ownership, Ownership::Owned);
    assert_eq!(attached.ownership, Ownership::Attached);

    let report = h.sup.shutdown().await;

    assert_eq!(report.attempted, 2);
    assert!(report.is_clean());
    assert_eq!(h.spawner.signals(0), vec![ProcessSignal::Interrupt]);
    assert!(h.channels.channel("Ganache:8545").unwrap().is_disposed());
    assert!(h.killer.pids().is_empty());
    assert!(h.sup.ports().await.is_empty());

    let requested = next_of(&mut rx, EventKind::DisposeRequested).await;
    assert_eq!(requested.count, Some(2));
    assert_eq!(requested.attempt, None);
    let completed = next_of(&mut rx, EventKind::DisposeCompleted).await;
    assert_eq!(completed.count, Some(2));
    assert_eq!(completed.reason, None);
}

#[tokio::test(start_paused = true)]
async fn stopped_owned_child_is_no_longer_watched() {
    let h = harness(ScriptedLookup::new([None], Some(4242)), ScriptedProbe::new([true], true));
    h.sup.start(PORT, &StartOptions::default()).await.unwrap();

    h.sup.stop(PORT, true).await.unwrap();

    assert_eq!(h.spawner.signals(0), vec![ProcessSignal::Interrupt]);
    assert!(h.spawner.exit_unwatched(0).await);
}

#[tokio::test(start_paused = true)]
async fn dispose_all_waits_for_start_in_progress() {
    let h = harness(
        ScriptedLookup::new([None], Some(4242)),
        ScriptedProbe::new([false, true], true),
    );

    let start = {
        let sup = h.sup.clone();
        tokio::spawn(async move { sup.start(PORT, &StartOptions::default()).await })
    };
    wait_for_spawn(&h.spawner, 1).await;
    assert!(h.sup.ports().await.is_empty());

    let report = h.sup.dispose_all().await;

    assert_eq!(report.attempted, 1);
    assert!(report.is_clean());
    assert!(h.sup.ports().await.is_empty());
    assert_eq!(h.spawner.signals(0), vec![ProcessSignal::Interrupt]);

    let handle = start.await.unwrap().unwrap();
    assert_eq!(handle.ownership, Ownership::Owned);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_in_flight_start() {
    let h = harness(ScriptedLookup::new([], None), ScriptedProbe::new([], false));

    let start = {
        let sup = h.sup.clone();
        tokio::spawn(async move { sup.start(PORT, &StartOptions::default()).await })
    };
    wait_for_spawn(&h.spawner, 1).await;
    assert_eq!(h.sup.state(PORT).await.unwrap(), NodeState::Starting);

    let report = h.sup.shutdown().await;
    assert_eq!(report.attempted, 0);

    let err = start.await.unwrap().unwrap_err();
    assert_eq!(err, SupervisorError::Cancelled { port: port(PORT) });
    assert_eq!(h.spawner.signals(0), vec![ProcessSignal::Kill]);

    let late = h.sup.start(PORT, &StartOptions::default()).await.unwrap_err();
    assert_eq!(late, SupervisorError::Cancelled { port: port(PORT) });
}

#[tokio::test(start_paused = true)]
async fn fork_options_reach_the_spawn_command() {
    let h = harness(ScriptedLookup::new([None], Some(4242)), ScriptedProbe::new([true], true));
    let opts = StartOptions::forked(ForkOptions {
        url: None,
        network: Some("mainnet".into()),
        block_number: 0,
    });

    h.sup.start(PORT, &opts).await.unwrap();

    let commands = h.spawner.commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(
        commands[0].args,
        vec!["ganache", "--port", "8545", "--fork.network", "mainnet"]
    );
}

#[tokio::test(start_paused = true)]
async fn lifecycle_events_are_published_in_order() {
    let h = harness(ScriptedLookup::new([None], Some(4242)), ScriptedProbe::new([false, true], true));
    let mut rx = h.sup.subscribe();

    h.sup.start(PORT, &StartOptions::default()).await.unwrap();

    let kinds: Vec<EventKind> = std::iter::from_fn(|| rx.try_recv().ok())
        .map(|ev| ev.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::StartRequested,
            EventKind::NodeSpawned,
            EventKind::ReadinessProbeFailed,
            EventKind::NodeReady,
        ]
    );
}
