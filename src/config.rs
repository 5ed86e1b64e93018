//! # Supervisor configuration.
//!
//! Provides [`SupervisorConfig`], the centralized settings for a
//! [`NodeSupervisor`](crate::NodeSupervisor).
//!
//! Config is used in two ways:
//! 1. **In code**: `SupervisorConfig::default()` and field overrides.
//! 2. **From a file**: [`SupervisorConfig::from_toml`] / [`SupervisorConfig::from_file`].
//!    Every key is optional; durations are given in milliseconds.
//!
//! ```toml
//! host = "127.0.0.1"
//! probe_timeout_ms = 2000
//! kill_grace_ms = 5000
//! bus_capacity = 1024
//!
//! [readiness]
//! max_attempts = 5
//! delay_ms = 2000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::policies::BackoffPolicy;
use crate::probe::ProbeSettings;

/// Global configuration for a node supervisor.
///
/// ## Field semantics
/// - `host`: Address used by liveness probes (`http://<host>:<port>`)
/// - `probe_timeout`: Limit for one liveness probe and one OS lookup
/// - `readiness`: Attempt budget and spacing used after spawning a node
/// - `kill_grace`: How long an interrupted child may take to exit before it is hard-killed
/// - `bus_capacity`: Event bus ring buffer size (min 1; clamped by Bus)
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorConfig {
    /// Host the nodes listen on.
    pub host: String,

    /// Timeout for a single liveness probe or OS port lookup.
    #[serde(rename = "probe_timeout_ms", with = "millis")]
    pub probe_timeout: Duration,

    /// Readiness waiting after spawn.
    pub readiness: ReadinessConfig,

    /// Grace period between the interrupt sent by `stop()` and a forced kill.
    ///
    /// `Duration::ZERO` = never escalate.
    #[serde(rename = "kill_grace_ms", with = "millis")]
    pub kill_grace: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,
}

/// Readiness budget after a node is spawned.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadinessConfig {
    /// Maximum number of liveness probes.
    pub max_attempts: u32,

    /// Fixed delay between two probes.
    #[serde(rename = "delay_ms", with = "millis")]
    pub delay: Duration,
}

impl Default for ReadinessConfig {
    /// `max_attempts = 5`, `delay = 2s`.
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(2000),
        }
    }
}

impl ReadinessConfig {
    /// Returns the constant backoff matching `delay`.
    #[inline]
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::constant(self.delay)
    }
}

impl SupervisorConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed input and
    /// [`ConfigError::Validation`] for unusable values.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] describing the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Validation("host must not be empty".into()));
        }
        if self.readiness.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "readiness.max_attempts must be at least 1".into(),
            ));
        }
        if self.bus_capacity == 0 {
            return Err(ConfigError::Validation("bus_capacity must be at least 1".into()));
        }
        Ok(())
    }

    /// Returns the kill grace period as an `Option`.
    ///
    /// - `None` → interrupted children are never hard-killed
    /// - `Some(d)` → hard kill after `d`
    #[inline]
    pub fn kill_grace(&self) -> Option<Duration> {
        (self.kill_grace != Duration::ZERO).then_some(self.kill_grace)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Base URL of a node listening on `port`.
    pub fn node_url(&self, port: crate::PortKey) -> String {
        format!("http://{}:{}", self.host, port)
    }

    /// Host and timeout handed to the kind's liveness probe.
    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            host: self.host.clone(),
            timeout: self.probe_timeout,
        }
    }
}

impl Default for SupervisorConfig {
    /// Default configuration:
    ///
    /// - `host = "127.0.0.1"`
    /// - `probe_timeout = 2s`
    /// - `readiness = 5 attempts, 2s apart`
    /// - `kill_grace = 5s`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            probe_timeout: Duration::from_secs(2),
            readiness: ReadinessConfig::default(),
            kill_grace: Duration::from_secs(5),
            bus_capacity: 1024,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
