//! Retry policies.
//!
//! This module holds the knob that controls **how long** to wait between two
//! readiness probes.
//!
//! ## Contents
//! - [`BackoffPolicy`] how probe delays evolve (first / factor / max)
//!
//! ## Quick wiring
//! ```text
//! SupervisorConfig { readiness: ReadinessConfig { max_attempts, delay } }
//!      └─► ReadinessConfig::backoff() = BackoffPolicy::constant(delay)
//!           └─► readiness::ReadinessWaiter uses backoff.next(attempt) between probes
//! ```
//!
//! ## Defaults
//! - `BackoffPolicy::default()` is `constant(2s)`.

mod backoff;

pub use backoff::BackoffPolicy;
