//! # Child output forwarding.
//!
//! - [`OutputSink`] drains a spawned node's stdout/stderr for as long as the node is owned.
//! - [`OutputChannel`] / [`ChannelFactory`] are the destination seam, with
//!   [`TracingChannels`] and [`MemoryChannels`] as built-ins.

mod channel;
mod sink;

pub use channel::{ChannelFactory, MemoryChannel, MemoryChannels, OutputChannel, TracingChannels};
pub use sink::{OutputSink, OutputStream, StreamKind};

/// Channel name for a node: `"<display name>:<port>"`.
pub fn channel_name(display_name: &str, port: crate::PortKey) -> String {
    format!("{display_name}:{port}")
}
