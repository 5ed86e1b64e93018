//! # Out-of-band kill by pid.
//!
//! Used for attached nodes, which this supervisor did not spawn and holds no
//! child reference to.
//!
//! | Platform | Mechanism                          |
//! |----------|------------------------------------|
//! | Unix     | `SIGKILL` via `nix`                |
//! | Windows  | `taskkill /PID <pid> /T /F`        |
//!
//! A pid that no longer exists counts as killed. On Unix only the pid itself is
//! signalled: an attached node may share its group with the user's shell.

use async_trait::async_trait;

use crate::error::KillError;

/// Terminates processes by pid.
#[async_trait]
pub trait ProcessKiller: Send + Sync + 'static {
    /// Forcibly terminates `pid`.
    async fn kill_pid(&self, pid: u32) -> Result<(), KillError>;
}

/// Platform kill implementation.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsProcessKiller;

#[async_trait]
impl ProcessKiller for OsProcessKiller {
    #[cfg(unix)]
    async fn kill_pid(&self, pid: u32) -> Result<(), KillError> {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid).map_err(|_| KillError::Signal {
            pid,
            reason: "pid out of range".to_string(),
        })?;
        match kill(Pid::from_raw(raw), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(KillError::Signal {
                pid,
                reason: e.to_string(),
            }),
        }
    }

    #[cfg(windows)]
    async fn kill_pid(&self, pid: u32) -> Result<(), KillError> {
        let output = tokio::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| KillError::Command {
                pid,
                reason: e.to_string(),
            })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(KillError::Command {
                pid,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}
