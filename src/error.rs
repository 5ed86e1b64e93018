//! Error types used by the node supervisor and its collaborators.
//!
//! This module defines the public error enum and the internal errors of the
//! collaborators it wraps:
//!
//! - [`SupervisorError`]: failures surfaced by [`NodeSupervisor`](crate::NodeSupervisor) operations.
//! - [`LookupError`]: the OS port lookup tool failed (downgraded to `Free`, never surfaced).
//! - [`SpawnError`]: the OS refused to create the child process.
//! - [`KillError`]: an out-of-band kill by pid failed.
//! - [`ConfigError`]: configuration could not be loaded or validated.
//!
//! [`SupervisorError`] provides helper methods (`as_label`, `as_message`) for logging/telemetry.

use std::time::Duration;
use thiserror::Error;

use crate::port::PortKey;

/// # Errors produced by supervisor operations.
///
/// Probe and lookup failures never show up here: they are recovered locally and
/// downgraded to the most conservative [`PortStatus`](crate::PortStatus).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    /// The port input is not a number in `1..=65535`.
    #[error("invalid port {input:?}: expected an integer between 1 and 65535")]
    InvalidPort {
        /// The rejected input, as given by the caller.
        input: String,
    },

    /// A process that is not our kind of node is listening on the port.
    #[error("port {port} is busy (pid {pid:?} does not answer as the expected node kind)")]
    PortBusy {
        /// The occupied port.
        port: PortKey,
        /// Pid of the listener, if the lookup found one.
        pid: Option<u32>,
    },

    /// The child process could not be created, or exited before becoming ready.
    #[error("failed to start node process on port {port}: {reason}")]
    ProcessSpawnFailure {
        /// The requested port.
        port: PortKey,
        /// OS error or exit description.
        reason: String,
    },

    /// The spawned process never passed its liveness probe within the readiness budget.
    #[error("node on port {port} did not become ready after {attempts} attempt(s)")]
    StartupTimeout {
        /// The requested port.
        port: PortKey,
        /// Number of probe attempts performed.
        attempts: u32,
    },

    /// The start was aborted because the supervisor is shutting down.
    #[error("start on port {port} cancelled")]
    Cancelled {
        /// The requested port.
        port: PortKey,
    },

    /// Out-of-band kill of an attached process failed.
    #[error("failed to kill pid {pid} on port {port}: {reason}")]
    KillFailed {
        /// The port whose handle was being stopped.
        port: PortKey,
        /// The pid we tried to kill.
        pid: u32,
        /// OS error description.
        reason: String,
    },
}

impl SupervisorError {
    /// Returns a short stable label (snake_case) for use in logs/telemetry.
    ///
    /// # Example
    /// ```
    /// use nodevisor::SupervisorError;
    ///
    /// let err = SupervisorError::InvalidPort { input: "abc".into() };
    /// assert_eq!(err.as_label(), "invalid_port");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorError::InvalidPort { .. } => "invalid_port",
            SupervisorError::PortBusy { .. } => "port_busy",
            SupervisorError::ProcessSpawnFailure { .. } => "process_spawn_failure",
            SupervisorError::StartupTimeout { .. } => "startup_timeout",
            SupervisorError::Cancelled { .. } => "cancelled",
            SupervisorError::KillFailed { .. } => "kill_failed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            SupervisorError::InvalidPort { input } => format!("invalid port: {input:?}"),
            SupervisorError::PortBusy { port, pid } => match pid {
                Some(pid) => format!("port {port} busy: pid={pid}"),
                None => format!("port {port} busy"),
            },
            SupervisorError::ProcessSpawnFailure { port, reason } => {
                format!("spawn failed on port {port}: {reason}")
            }
            SupervisorError::StartupTimeout { port, attempts } => {
                format!("startup timeout on port {port}: attempts={attempts}")
            }
            SupervisorError::Cancelled { port } => format!("start cancelled on port {port}"),
            SupervisorError::KillFailed { port, pid, reason } => {
                format!("kill failed on port {port}: pid={pid} error={reason}")
            }
        }
    }

    /// Returns the port the error refers to, if it was valid.
    pub fn port(&self) -> Option<PortKey> {
        match self {
            SupervisorError::InvalidPort { .. } => None,
            SupervisorError::PortBusy { port, .. }
            | SupervisorError::ProcessSpawnFailure { port, .. }
            | SupervisorError::StartupTimeout { port, .. }
            | SupervisorError::Cancelled { port }
            | SupervisorError::KillFailed { port, .. } => Some(*port),
        }
    }
}

/// # Errors produced by the OS port lookup.
///
/// Never returned from public supervisor operations; the probe logs these and
/// treats the port as free.
#[derive(Error, Debug)]
pub enum LookupError {
    /// The lookup tool could not be executed (not installed, permission denied).
    #[error("failed to run {tool}: {source}")]
    Exec {
        /// Tool name.
        tool: &'static str,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The lookup tool exited unsuccessfully.
    #[error("{tool} exited with status {status:?}: {stderr}")]
    Status {
        /// Tool name.
        tool: &'static str,
        /// Exit code, if any.
        status: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// The tool output could not be interpreted.
    #[error("unexpected {tool} output: {line:?}")]
    Parse {
        /// Tool name.
        tool: &'static str,
        /// Offending line.
        line: String,
    },

    /// The lookup did not complete in time.
    #[error("{tool} did not finish within {timeout:?}")]
    Timeout {
        /// Tool name.
        tool: &'static str,
        /// Configured limit.
        timeout: Duration,
    },
}

/// # Errors produced by the spawn primitive.
#[derive(Error, Debug)]
pub enum SpawnError {
    /// The OS failed to create the process.
    #[error("failed to spawn {program:?}: {source}")]
    Io {
        /// Program that was being executed.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The spawner refused the command before touching the OS.
    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

/// # Errors produced by out-of-band kills.
#[derive(Error, Debug)]
pub enum KillError {
    /// Signal delivery failed.
    #[error("signal delivery to pid {pid} failed: {reason}")]
    Signal {
        /// Target pid.
        pid: u32,
        /// OS error description.
        reason: String,
    },

    /// The platform kill command failed.
    #[error("kill command for pid {pid} failed: {reason}")]
    Command {
        /// Target pid.
        pid: u32,
        /// Exit status or I/O error description.
        reason: String,
    },
}

/// # Errors produced while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration is not valid TOML for [`SupervisorConfig`](crate::SupervisorConfig).
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration parsed but holds unusable values.
    #[error("invalid config: {0}")]
    Validation(String),
}
