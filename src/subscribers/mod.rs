//! # Event subscribers for the node supervisor.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and built-in implementations for handling lifecycle events broadcast through
//! the [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   NodeSupervisor ── publish(Event) ──► Bus ──► subscriber_listener ──► SubscriberSet
//!                                                                           │
//!                                                         ┌─────────────────┼──────────┐
//!                                                         ▼                 ▼          ▼
//!                                                     LogWriter    TelemetryBridge   Custom
//! ```
//!
//! ## Built-ins
//! - [`LogWriter`] (feature `logging`) renders events through `tracing`.
//! - [`TelemetryBridge`] forwards events to a fire-and-forget [`Telemetry`] sink.

#[cfg(feature = "logging")]
mod log;
mod subscriber;
mod subscriber_set;
mod telemetry;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use subscriber::Subscribe;
pub use subscriber_set::SubscriberSet;
pub use telemetry::{Telemetry, TelemetryBridge, TelemetryProps};
