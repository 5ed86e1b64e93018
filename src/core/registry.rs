//! # Process registry.
//!
//! Table `PortKey → ProcessHandle` owned by one supervisor. The supervisor is
//! its only mutator, always while holding the port's gate, so each method here
//! is a single atomic step.
//!
//! ## Rules
//! - At most one handle per port
//! - A handle with `process` set is **Owned**; without it is **Attached**
//! - `output` is present iff `process` is present
//! - `generation` is unique per handle and filters stale exit notifications

use std::collections::HashMap;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::output::OutputSink;
use crate::port::PortKey;
use crate::process::ChildControl;

/// How the supervisor relates to the process behind a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Spawned by this supervisor.
    Owned,
    /// Found already running and adopted.
    Attached,
}

impl Ownership {
    /// Short label used in events.
    pub fn as_label(&self) -> &'static str {
        match self {
            Ownership::Owned => "owned",
            Ownership::Attached => "attached",
        }
    }
}

/// Caller-facing snapshot of a registered node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeHandle {
    /// Port the node listens on.
    pub port: PortKey,
    /// OS pid, when known.
    pub pid: Option<u32>,
    /// Owned or attached.
    pub ownership: Ownership,
    /// Base RPC URL of the node.
    pub url: String,
}

/// Child reference kept for owned handles.
pub(crate) struct OwnedProcess {
    pub(crate) control: ChildControl,
    pub(crate) watcher: JoinHandle<()>,
}

/// Registry entry.
pub(crate) struct ProcessHandle {
    pub(crate) port: PortKey,
    pub(crate) pid: Option<u32>,
    pub(crate) process: Option<OwnedProcess>,
    pub(crate) output: Option<OutputSink>,
    pub(crate) generation: u64,
    pub(crate) url: String,
}

impl ProcessHandle {
    pub(crate) fn attached(port: PortKey, pid: Option<u32>, generation: u64, url: String) -> Self {
        Self {
            port,
            pid,
            process: None,
            output: None,
            generation,
            url,
        }
    }

    pub(crate) fn owned(
        port: PortKey,
        pid: Option<u32>,
        process: OwnedProcess,
        output: OutputSink,
        generation: u64,
        url: String,
    ) -> Self {
        Self {
            port,
            pid,
            process: Some(process),
            output: Some(output),
            generation,
            url,
        }
    }

    pub(crate) fn ownership(&self) -> Ownership {
        if self.process.is_some() {
            Ownership::Owned
        } else {
            Ownership::Attached
        }
    }

    /// Owned handle whose child is gone (exit not reconciled yet).
    pub(crate) fn is_stale(&self) -> bool {
        self.process
            .as_ref()
            .is_some_and(|p| !p.control.is_alive())
    }

    pub(crate) fn snapshot(&self) -> NodeHandle {
        NodeHandle {
            port: self.port,
            pid: self.pid,
            ownership: self.ownership(),
            url: self.url.clone(),
        }
    }

    /// Releases local resources without signalling the process.
    pub(crate) fn release(&mut self) {
        if let Some(output) = self.output.as_mut() {
            output.dispose();
        }
        if let Some(process) = self.process.take() {
            process.watcher.abort();
        }
    }
}

/// Port-keyed table of registered nodes.
pub(crate) struct ProcessRegistry {
    entries: RwLock<HashMap<PortKey, ProcessHandle>>,
}

impl ProcessRegistry {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts `handle`, returning the entry it replaced.
    pub(crate) async fn insert(&self, handle: ProcessHandle) -> Option<ProcessHandle> {
        self.entries.write().await.insert(handle.port, handle)
    }

    /// Removes and returns the entry for `port`.
    pub(crate) async fn take(&self, port: PortKey) -> Option<ProcessHandle> {
        self.entries.write().await.remove(&port)
    }

    /// Removes the entry for `port` only if it is still `generation`.
    pub(crate) async fn take_generation(&self, port: PortKey, generation: u64) -> Option<ProcessHandle> {
        let mut entries = self.entries.write().await;
        match entries.get(&port) {
            Some(h) if h.generation == generation => entries.remove(&port),
            _ => None,
        }
    }

    /// Removes the entry for `port` if its owned child is gone.
    pub(crate) async fn take_stale(&self, port: PortKey) -> Option<ProcessHandle> {
        let mut entries = self.entries.write().await;
        match entries.get(&port) {
            Some(h) if h.is_stale() => entries.remove(&port),
            _ => None,
        }
    }

    pub(crate) async fn snapshot(&self, port: PortKey) -> Option<NodeHandle> {
        self.entries.read().await.get(&port).map(ProcessHandle::snapshot)
    }

    /// Sorted list of registered ports.
    pub(crate) async fn ports(&self) -> Vec<PortKey> {
        let entries = self.entries.read().await;
        let mut ports: Vec<PortKey> = entries.keys().copied().collect();
        ports.sort_unstable();
        ports
    }

    pub(crate) async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
