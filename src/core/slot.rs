//! # Per-port gates.
//!
//! Every operation that mutates a port's registry entry (start, stop, exit
//! reconciliation) runs while holding that port's gate. Different ports never
//! contend.
//!
//! ```text
//! start(8545) ──► acquire(8545) ──► [Starting] ... [Idle] ──► release
//! start(8545) ──► acquire(8545) ─────────── waits ───────────► observes result
//! stop(7545)  ──► acquire(7545) ──► [Stopping] ... [Idle] ──► release   (concurrent)
//! ```
//!
//! The status goes back to `Idle` when the [`SlotGuard`] drops, including when
//! the operation's future is dropped mid-way.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

use crate::port::PortKey;

/// What the gate holder is doing with a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotStatus {
    /// No operation in progress.
    Idle,
    /// A `start()` holds the gate.
    Starting,
    /// A `stop()` holds the gate.
    Stopping,
}

struct SlotState {
    gate: Arc<tokio::sync::Mutex<()>>,
    status: SlotStatus,
}

impl SlotState {
    fn new() -> Self {
        Self {
            gate: Arc::new(tokio::sync::Mutex::new(())),
            status: SlotStatus::Idle,
        }
    }
}

/// Gate map; slots are created on first use and kept for the supervisor's lifetime.
pub(crate) struct PortSlots {
    slots: Mutex<HashMap<PortKey, SlotState>>,
}

impl PortSlots {
    pub(crate) fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Waits for exclusive access to `port`.
    pub(crate) async fn acquire(&self, port: PortKey) -> SlotGuard<'_> {
        let gate = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(port).or_insert_with(SlotState::new).gate.clone()
        };
        SlotGuard {
            slots: self,
            port,
            _gate: gate.lock_owned().await,
        }
    }

    pub(crate) fn status(&self, port: PortKey) -> SlotStatus {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&port)
            .map_or(SlotStatus::Idle, |s| s.status)
    }

    /// Ports whose gate is held right now.
    pub(crate) fn busy_ports(&self) -> Vec<PortKey> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, slot)| slot.gate.try_lock().is_err())
            .map(|(port, _)| *port)
            .collect()
    }

    fn set_status(&self, port: PortKey, status: SlotStatus) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(port).or_insert_with(SlotState::new).status = status;
    }
}

/// Exclusive access to one port.
pub(crate) struct SlotGuard<'a> {
    slots: &'a PortSlots,
    port: PortKey,
    _gate: OwnedMutexGuard<()>,
}

impl SlotGuard<'_> {
    /// Records what the holder is doing.
    pub(crate) fn mark(&self, status: SlotStatus) {
        self.slots.set_status(self.port, status);
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.slots.set_status(self.port, SlotStatus::Idle);
    }
}
