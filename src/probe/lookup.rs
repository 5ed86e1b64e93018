//! # OS port → pid lookup.
//!
//! [`PortLookup`] answers one question: which process, if any, is in LISTEN
//! state on a TCP port. [`OsPortLookup`] asks the platform's socket listing tool:
//!
//! | Platform | Command                                   | Output                         |
//! |----------|-------------------------------------------|--------------------------------|
//! | Windows  | `netstat -ano -p tcp`                     | table, filtered by local port  |
//! | POSIX    | `lsof -nP -iTCP:<port> -sTCP:LISTEN -t`   | one pid per line               |
//!
//! Both reduce to a single pid (the first listener found) or "not found".
//! Tool failures are reported as [`LookupError`]; the ownership probe downgrades
//! them to `Free`.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::LookupError;
use crate::port::PortKey;

/// Finds the process listening on a port.
#[async_trait]
pub trait PortLookup: Send + Sync + 'static {
    /// Returns the pid in LISTEN state on `port`, `None` if nothing listens.
    async fn find_listener(&self, port: PortKey) -> Result<Option<u32>, LookupError>;
}

/// Lookup backed by `netstat` (Windows) or `lsof` (everything else).
#[derive(Clone, Debug)]
pub struct OsPortLookup {
    timeout: Duration,
}

impl OsPortLookup {
    /// Creates a lookup whose tool invocation is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run(&self, tool: &'static str, args: &[String]) -> Result<std::process::Output, LookupError> {
        let mut cmd = Command::new(tool);
        cmd.args(args).kill_on_drop(true);

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(source)) => Err(LookupError::Exec { tool, source }),
            Err(_elapsed) => Err(LookupError::Timeout {
                tool,
                timeout: self.timeout,
            }),
        }
    }
}

impl Default for OsPortLookup {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl PortLookup for OsPortLookup {
    #[cfg(windows)]
    async fn find_listener(&self, port: PortKey) -> Result<Option<u32>, LookupError> {
        let args = ["-ano", "-p", "tcp"].map(String::from);
        let output = self.run("netstat", &args).await?;
        if !output.status.success() {
            return Err(status_error("netstat", &output));
        }
        parse_netstat(&String::from_utf8_lossy(&output.stdout), port)
    }

    #[cfg(not(windows))]
    async fn find_listener(&self, port: PortKey) -> Result<Option<u32>, LookupError> {
        let args = [
            "-nP".to_string(),
            format!("-iTCP:{port}"),
            "-sTCP:LISTEN".to_string(),
            "-t".to_string(),
        ];
        let output = self.run("lsof", &args).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        // lsof exits with 1 when nothing matches.
        if !output.status.success() {
            if output.status.code() == Some(1) && stdout.trim().is_empty() {
                return Ok(None);
            }
            return Err(status_error("lsof", &output));
        }
        parse_lsof(&stdout)
    }
}

fn status_error(tool: &'static str, output: &std::process::Output) -> LookupError {
    LookupError::Status {
        tool,
        status: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

/// Parses `lsof -t` output: one pid per line.
pub(crate) fn parse_lsof(stdout: &str) -> Result<Option<u32>, LookupError> {
    let Some(line) = stdout.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return Ok(None);
    };
    line.parse::<u32>().map(Some).map_err(|_| LookupError::Parse {
        tool: "lsof",
        line: line.to_string(),
    })
}

/// Parses `netstat -ano` output, returning the pid of the first LISTENING row on `port`.
///
/// Row shape: `TCP  <local addr>:<port>  <remote addr>  LISTENING  <pid>`.
pub(crate) fn parse_netstat(stdout: &str, port: PortKey) -> Result<Option<u32>, LookupError> {
    let suffix = format!(":{port}");

    for line in stdout.lines() {
        let cols: Vec<&str> = line.split_whitespace().collect();
        let [proto, local, _remote, state, pid] = cols.as_slice() else {
            continue;
        };
        if !proto.eq_ignore_ascii_case("tcp") || !state.eq_ignore_ascii_case("listening") {
            continue;
        }
        if !local.ends_with(&suffix) {
            continue;
        }
        return pid.parse::<u32>().map(Some).map_err(|_| LookupError::Parse {
            tool: "netstat",
            line: line.trim().to_string(),
        });
    }
    Ok(None)
}
