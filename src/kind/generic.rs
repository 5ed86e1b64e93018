//! # User-described JSON-RPC nodes.

use std::path::PathBuf;
use std::sync::Arc;

use crate::kind::{fork_flags, NodeKind, StartOptions};
use crate::port::PortKey;
use crate::probe::{JsonRpcProbe, LivenessProbe, ProbeSettings};
use crate::process::SpawnCommand;

/// Any JSON-RPC node launched as `<program> <args> --port <port>`.
///
/// Recognized by a non-empty `web3_clientVersion` result.
///
/// # Example
/// ```rust
/// use nodevisor::{Generic, NodeKind, PortKey, StartOptions};
///
/// let anvil = Generic::new("anvil", "Anvil", "anvil").fork_capable(true);
/// let cmd = anvil.command(PortKey::new(8545).unwrap(), &StartOptions::default());
/// assert_eq!(cmd.display(), "anvil --port 8545");
/// ```
#[derive(Clone, Debug)]
pub struct Generic {
    name: String,
    display_name: String,
    program: String,
    base_args: Vec<String>,
    env: Vec<(String, String)>,
    cwd: Option<PathBuf>,
    forkable: bool,
}

impl Generic {
    /// Creates a kind running `program`.
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        program: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            program: program.into(),
            base_args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            forkable: false,
        }
    }

    /// Arguments placed before `--port`.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Adds an environment variable to every launch.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Launch directory.
    pub fn with_cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Whether fork options translate into `--fork.*` flags.
    pub fn fork_capable(mut self, forkable: bool) -> Self {
        self.forkable = forkable;
        self
    }
}

impl NodeKind for Generic {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn command(&self, port: PortKey, options: &StartOptions) -> SpawnCommand {
        let mut cmd = SpawnCommand::new(self.program.clone())
            .args(self.base_args.iter().cloned())
            .args(["--port".to_string(), port.to_string()]);
        if self.forkable {
            if let Some(fork) = &options.fork {
                cmd = cmd.args(fork_flags(fork));
            }
        }
        cmd.env = self.env.clone();
        cmd.cwd = self.cwd.clone();
        cmd.args(options.extra_args.iter().cloned())
    }

    fn liveness(&self, settings: ProbeSettings) -> Arc<dyn LivenessProbe> {
        Arc::new(JsonRpcProbe::client_version(settings))
    }
}
