//! # Spacing between readiness probes.
//!
//! The supervisor probes a freshly spawned node, sleeps, and probes again. The
//! sleep before retry `n` (0-indexed) is `first·factorⁿ`, capped at `max`.
//! The stock readiness schedule is constant: [`BackoffPolicy::constant`] with
//! `ReadinessConfig::delay`.
//!
//! ```text
//! constant(2s):            probe ─2s─ probe ─2s─ probe ─2s─ probe ─2s─ probe
//! first=500ms, factor=2:   probe ─0.5s─ probe ─1s─ probe ─2s─ probe ─4s─ probe
//! ```
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use nodevisor::BackoffPolicy;
//!
//! let slow_start = BackoffPolicy {
//!     first: Duration::from_millis(500),
//!     max: Duration::from_secs(3),
//!     factor: 2.0,
//! };
//! let schedule: Vec<_> = (0..4).map(|n| slow_start.next(n)).collect();
//! assert_eq!(
//!     schedule,
//!     [500, 1000, 2000, 3000].map(Duration::from_millis).to_vec()
//! );
//! ```

use std::time::Duration;

/// Delay schedule between two probes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub first: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Growth per retry; `1.0` keeps every delay at `first`.
    pub factor: f64,
}

impl Default for BackoffPolicy {
    /// The readiness default: a constant 2s.
    fn default() -> Self {
        Self::constant(Duration::from_secs(2))
    }
}

impl BackoffPolicy {
    /// Same delay before every retry.
    pub fn constant(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
        }
    }

    /// Delay to wait after failed attempt `retry` (0-indexed).
    ///
    /// Overflowing, negative or NaN results fall back to `max`.
    pub fn next(&self, retry: u32) -> Duration {
        let exp = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        Duration::try_from_secs_f64(secs)
            .ok()
            .filter(|d| *d <= self.max)
            .unwrap_or(self.max)
    }
}
