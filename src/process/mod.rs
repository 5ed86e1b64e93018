//! # Process primitives.
//!
//! The supervisor never touches `tokio::process` directly. It goes through two seams:
//!
//! - [`Spawner`] creates a child from a [`SpawnCommand`] and returns a
//!   [`SpawnedChild`]: its pid, its output streams, a [`ChildControl`] for
//!   signals and a one-shot exit notification. Signals reach the child's
//!   whole process group, not only its pid.
//! - [`ProcessKiller`] terminates an arbitrary pid (out-of-band kill of
//!   attached nodes).
//!
//! [`TokioSpawner`] and [`OsProcessKiller`] are the OS-backed implementations.

mod killer;
mod spawner;

use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot};

use crate::error::SpawnError;
use crate::output::OutputStream;

pub use killer::{OsProcessKiller, ProcessKiller};
pub use spawner::TokioSpawner;

/// Program invocation produced by a [`NodeKind`](crate::NodeKind).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpawnCommand {
    /// Executable name or path.
    pub program: String,
    /// Arguments, in order.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Working directory; inherited when `None`.
    pub cwd: Option<PathBuf>,
}

impl SpawnCommand {
    /// Creates a command for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Adds an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Sets the working directory.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Renders the command line for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Signal requested through a [`ChildControl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSignal {
    /// Graceful interrupt (SIGINT where signals exist).
    Interrupt,
    /// Immediate termination.
    Kill,
}

/// Sends signals to a spawned child's driver.
#[derive(Clone, Debug)]
pub struct ChildControl {
    tx: mpsc::UnboundedSender<ProcessSignal>,
}

impl ChildControl {
    /// Creates a control and the receiving end consumed by the child's driver.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProcessSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Requests a graceful interrupt. Returns false if the child is already gone.
    pub fn interrupt(&self) -> bool {
        self.tx.send(ProcessSignal::Interrupt).is_ok()
    }

    /// Requests a hard kill. Returns false if the child is already gone.
    pub fn kill(&self) -> bool {
        self.tx.send(ProcessSignal::Kill).is_ok()
    }

    /// Returns true while the child's driver still listens.
    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Exit code of a child (`None` when terminated by a signal or unknown).
pub type ExitCode = Option<i32>;

/// A freshly spawned child.
pub struct SpawnedChild {
    /// OS pid reported at spawn time.
    pub pid: Option<u32>,
    /// Captured standard output.
    pub stdout: Option<OutputStream>,
    /// Captured standard error.
    pub stderr: Option<OutputStream>,
    /// Signal channel.
    pub control: ChildControl,
    /// Resolves once the child exited.
    pub exited: oneshot::Receiver<ExitCode>,
}

/// Creates child processes.
pub trait Spawner: Send + Sync + 'static {
    /// Spawns `command`. Must be called from within a tokio runtime.
    fn spawn(&self, command: &SpawnCommand) -> Result<SpawnedChild, SpawnError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_and_display() {
        let cmd = SpawnCommand::new("npx")
            .arg("ganache")
            .args(["--port", "8545"])
            .env("NODE_ENV", "test");
        assert_eq!(cmd.display(), "npx ganache --port 8545");
        assert_eq!(cmd.env, vec![("NODE_ENV".to_string(), "test".to_string())]);
        assert!(cmd.cwd.is_none());
    }

    #[tokio::test]
    async fn control_reports_closed_driver() {
        let (control, rx) = ChildControl::channel();
        assert!(control.is_alive());
        drop(rx);
        assert!(!control.interrupt());
        assert!(!control.is_alive());
    }
}
