//! # Output channels.
//!
//! An [`OutputChannel`] is a named, line-oriented destination for a node's
//! console output (an editor panel, a log file, a ring buffer). A
//! [`ChannelFactory`] opens one channel per started node, named
//! `"<kind display name>:<port>"`.
//!
//! Built-ins:
//! - [`TracingChannels`] writes every line as a `tracing` event (default).
//! - [`MemoryChannels`] retains lines in memory for display or inspection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;

/// Line-oriented output destination.
pub trait OutputChannel: Send + Sync + 'static {
    /// Appends one line (without its terminator).
    fn append_line(&self, line: &str);

    /// Releases the channel. Called exactly once by [`OutputSink`](crate::OutputSink).
    fn dispose(&self);
}

/// Opens named output channels.
pub trait ChannelFactory: Send + Sync + 'static {
    /// Opens (or creates) the channel called `name`.
    fn open(&self, name: &str) -> Arc<dyn OutputChannel>;
}

/// Factory whose channels log each line at `INFO` under `nodevisor::output`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingChannels;

struct TracingChannel {
    name: Arc<str>,
}

impl OutputChannel for TracingChannel {
    fn append_line(&self, line: &str) {
        info!(target: "nodevisor::output", channel = %self.name, "{line}");
    }

    fn dispose(&self) {}
}

impl ChannelFactory for TracingChannels {
    fn open(&self, name: &str) -> Arc<dyn OutputChannel> {
        Arc::new(TracingChannel {
            name: Arc::from(name),
        })
    }
}

/// In-memory channel retaining every appended line.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    lines: Mutex<Vec<String>>,
    disposals: AtomicUsize,
}

impl MemoryChannel {
    /// Snapshot of the lines appended so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns true once the channel has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposals.load(Ordering::SeqCst) > 0
    }

    /// Number of `dispose()` calls received.
    pub fn dispose_count(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }
}

impl OutputChannel for MemoryChannel {
    fn append_line(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }

    fn dispose(&self) {
        self.disposals.fetch_add(1, Ordering::SeqCst);
    }
}

/// Factory handing out [`MemoryChannel`]s, retrievable by name afterwards.
///
/// Re-opening a name replaces the previous channel.
#[derive(Debug, Default)]
pub struct MemoryChannels {
    channels: Mutex<HashMap<String, Arc<MemoryChannel>>>,
}

impl MemoryChannels {
    /// Creates an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the most recently opened channel called `name`.
    pub fn channel(&self, name: &str) -> Option<Arc<MemoryChannel>> {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Names of every channel opened so far.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl ChannelFactory for MemoryChannels {
    fn open(&self, name: &str) -> Arc<dyn OutputChannel> {
        let channel = Arc::new(MemoryChannel::default());
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), channel.clone());
        channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_channels_are_retrievable_by_name() {
        let factory = MemoryChannels::new();
        let ch = factory.open("Ganache:8545");
        ch.append_line("Listening on 127.0.0.1:8545");
        ch.dispose();

        let mem = factory.channel("Ganache:8545").unwrap();
        assert_eq!(mem.lines(), vec!["Listening on 127.0.0.1:8545".to_string()]);
        assert!(mem.is_disposed());
        assert!(factory.channel("Ganache:7545").is_none());
    }

    #[test]
    fn reopening_replaces_channel() {
        let factory = MemoryChannels::new();
        factory.open("Dashboard:24012").append_line("old");
        factory.open("Dashboard:24012");

        let mem = factory.channel("Dashboard:24012").unwrap();
        assert!(mem.lines().is_empty());
        assert_eq!(factory.names(), vec!["Dashboard:24012".to_string()]);
    }
}
