//! # OS-backed spawner.
//!
//! Every child leads its own process group (a job tree on Windows), so that
//! launchers such as `npx` take their real server process with them. Signals
//! always target the whole group.
//!
//! Each child gets a driver task that owns the `tokio::process::Child`:
//!
//! ```text
//! loop {
//!   select! {
//!     child.wait()        ──► send exit code on `exited`, stop
//!     Interrupt           ──► SIGINT to the group (unix) / tree kill (elsewhere), arm grace timer
//!     Kill                ──► SIGKILL to the group / tree kill
//!     grace timer elapsed ──► SIGKILL to the group / tree kill
//!   }
//! }
//! after exit, if an interrupt armed the timer:
//!   sleep until the deadline ──► SIGKILL to whatever is left of the group
//! ```

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::select;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::SpawnError;
use crate::output::OutputStream;
use crate::process::{ChildControl, ExitCode, ProcessSignal, SpawnCommand, SpawnedChild, Spawner};

/// Spawns children with `tokio::process`, stdout/stderr piped.
#[derive(Clone, Debug, Default)]
pub struct TokioSpawner {
    kill_grace: Option<Duration>,
}

impl TokioSpawner {
    /// `kill_grace`: how long an interrupted child may take to exit before its
    /// group is hard-killed (`None` waits indefinitely).
    pub fn new(kill_grace: Option<Duration>) -> Self {
        Self { kill_grace }
    }
}

impl Spawner for TokioSpawner {
    fn spawn(&self, command: &SpawnCommand) -> Result<SpawnedChild, SpawnError> {
        if command.program.trim().is_empty() {
            return Err(SpawnError::InvalidCommand("empty program".to_string()));
        }

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        if let Some(dir) = &command.cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| SpawnError::Io {
            program: command.program.clone(),
            source,
        })?;
        let pid = child.id();
        let stdout = child.stdout.take().map(|s| Box::new(s) as OutputStream);
        let stderr = child.stderr.take().map(|s| Box::new(s) as OutputStream);

        let (control, signals) = ChildControl::channel();
        let (exit_tx, exited) = oneshot::channel();
        tokio::spawn(drive(child, pid, signals, exit_tx, self.kill_grace));

        debug!(pid = ?pid, command = %command.display(), "child spawned");
        Ok(SpawnedChild {
            pid,
            stdout,
            stderr,
            control,
            exited,
        })
    }
}

async fn drive(
    mut child: Child,
    pid: Option<u32>,
    mut signals: mpsc::UnboundedReceiver<ProcessSignal>,
    exit_tx: oneshot::Sender<ExitCode>,
    kill_grace: Option<Duration>,
) {
    let mut deadline: Option<Instant> = None;

    let status = loop {
        select! {
            status = child.wait() => break status,
            Some(signal) = signals.recv() => match signal {
                ProcessSignal::Interrupt => {
                    interrupt_tree(&mut child, pid).await;
                    if deadline.is_none() {
                        deadline = kill_grace.map(|g| Instant::now() + g);
                    }
                }
                ProcessSignal::Kill => kill_tree(&mut child, pid).await,
            },
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                warn!(pid = ?pid, grace = ?kill_grace, "child ignored interrupt; killing");
                deadline = None;
                kill_tree(&mut child, pid).await;
            }
        }
    };

    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            warn!(pid = ?pid, error = %e, "failed to wait for child");
            None
        }
    };
    debug!(pid = ?pid, code = ?code, "child exited");
    let _ = exit_tx.send(code);

    // The leader is gone; group members that outlived the interrupt are killed
    // once the grace period ends.
    if let Some(deadline) = deadline {
        tokio::time::sleep_until(deadline).await;
        reap_group(pid);
    }
}

/// Sends `signal` to the process group led by `pid`. A vanished group counts as delivered.
#[cfg(unix)]
fn signal_group(pid: Option<u32>, signal: nix::sys::signal::Signal) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let Some(raw) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return false;
    };
    match killpg(Pid::from_raw(raw), signal) {
        Ok(()) | Err(Errno::ESRCH) => true,
        Err(e) => {
            debug!(pgid = raw, ?signal, error = %e, "group signal failed");
            false
        }
    }
}

#[cfg(unix)]
async fn interrupt_tree(child: &mut Child, pid: Option<u32>) {
    if !signal_group(pid, nix::sys::signal::Signal::SIGINT) {
        start_kill(child, pid);
    }
}

#[cfg(unix)]
async fn kill_tree(child: &mut Child, pid: Option<u32>) {
    if !signal_group(pid, nix::sys::signal::Signal::SIGKILL) {
        start_kill(child, pid);
    }
}

#[cfg(unix)]
fn reap_group(pid: Option<u32>) {
    if signal_group(pid, nix::sys::signal::Signal::SIGKILL) {
        debug!(pgid = ?pid, "killed leftover group members");
    }
}

/// No console interrupt can be sent to a detached child; the tree is killed.
#[cfg(not(unix))]
async fn interrupt_tree(child: &mut Child, pid: Option<u32>) {
    kill_tree(child, pid).await;
}

#[cfg(not(unix))]
async fn kill_tree(child: &mut Child, pid: Option<u32>) {
    let Some(pid) = pid else {
        start_kill(child, None);
        return;
    };
    let killed = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .is_ok_and(|status| status.success());
    if !killed {
        start_kill(child, Some(pid));
    }
}

// `taskkill /T` needs the root of the tree alive; nothing is left to find once it exited.
#[cfg(not(unix))]
fn reap_group(_pid: Option<u32>) {}

fn start_kill(child: &mut Child, pid: Option<u32>) {
    if let Err(e) = child.start_kill() {
        debug!(pid = ?pid, error = %e, "kill failed");
    }
}
