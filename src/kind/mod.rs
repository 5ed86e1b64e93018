//! # Node kinds.
//!
//! A [`NodeKind`] is the capability set that distinguishes one kind of local
//! node from another: how to launch it and how to recognize it on a port.
//! One [`NodeSupervisor`](crate::NodeSupervisor) manages exactly one kind.
//!
//! | Kind          | Command                                              | Liveness                         |
//! |---------------|------------------------------------------------------|----------------------------------|
//! | [`Ganache`]   | `npx ganache --port <p>` + fork flags                | `net_listening` → `true`         |
//! | [`Dashboard`] | `npx truffle dashboard --port <p> --no-auto-open`    | `GET /` → 200                    |
//! | [`Generic`]   | `<program> <args> --port <p>` (+ fork flags if set)  | `web3_clientVersion` → non-empty |

mod dashboard;
mod ganache;
mod generic;

use std::sync::Arc;

use serde::Deserialize;

use crate::port::PortKey;
use crate::probe::{LivenessProbe, ProbeSettings};
use crate::process::SpawnCommand;

pub use dashboard::Dashboard;
pub use ganache::Ganache;
pub use generic::Generic;

/// Fork network sentinel meaning "no named network".
pub const OTHER_NETWORK: &str = "other";

/// Per-kind launch and recognition strategy.
pub trait NodeKind: Send + Sync + 'static {
    /// Short machine name (`"ganache"`), used in events and telemetry names.
    fn name(&self) -> &str;

    /// Human-facing name (`"Ganache"`), used for output channel names.
    fn display_name(&self) -> &str;

    /// Builds the command that launches a node on `port`.
    fn command(&self, port: PortKey, options: &StartOptions) -> SpawnCommand;

    /// Builds this kind's liveness probe.
    fn liveness(&self, settings: ProbeSettings) -> Arc<dyn LivenessProbe>;
}

/// Fork configuration for fork-capable kinds.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ForkOptions {
    /// Upstream RPC URL.
    pub url: Option<String>,
    /// Named network; [`OTHER_NETWORK`] is ignored.
    pub network: Option<String>,
    /// Block to fork from; `0` means latest.
    pub block_number: u64,
}

/// Options for one `start()` call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StartOptions {
    /// Fork settings, honored by fork-capable kinds only.
    pub fork: Option<ForkOptions>,
    /// Arguments appended verbatim after the kind's own flags.
    pub extra_args: Vec<String>,
}

impl StartOptions {
    /// Options forking with `fork`.
    pub fn forked(fork: ForkOptions) -> Self {
        Self {
            fork: Some(fork),
            ..Self::default()
        }
    }
}

/// Translates fork options into CLI flags.
///
/// - `--fork.url <url>` if the URL is non-empty
/// - `--fork.network <name>` if the name is non-empty and not `"other"` (any case)
/// - `--fork.blockNumber <n>` if `n > 0`
pub fn fork_flags(fork: &ForkOptions) -> Vec<String> {
    let mut flags = Vec::new();

    if let Some(url) = non_empty(fork.url.as_deref()) {
        flags.push("--fork.url".to_string());
        flags.push(url.to_string());
    }
    if let Some(network) = non_empty(fork.network.as_deref()) {
        if !network.eq_ignore_ascii_case(OTHER_NETWORK) {
            flags.push("--fork.network".to_string());
            flags.push(network.to_string());
        }
    }
    if fork.block_number > 0 {
        flags.push("--fork.blockNumber".to_string());
        flags.push(fork.block_number.to_string());
    }
    flags
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// `npx` as resolvable on this platform.
pub(crate) fn npx() -> &'static str {
    if cfg!(windows) {
        "npx.cmd"
    } else {
        "npx"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_fork_flags() {
        let fork = ForkOptions {
            url: Some("https://rpc.example".into()),
            network: Some("mainnet".into()),
            block_number: 17_000_000,
        };
        assert_eq!(
            fork_flags(&fork),
            vec![
                "--fork.url",
                "https://rpc.example",
                "--fork.network",
                "mainnet",
                "--fork.blockNumber",
                "17000000"
            ]
        );
    }

    #[test]
    fn empty_and_sentinel_values_are_skipped() {
        let fork = ForkOptions {
            url: Some("  ".into()),
            network: Some("Other".into()),
            block_number: 0,
        };
        assert!(fork_flags(&fork).is_empty());
        assert!(fork_flags(&ForkOptions::default()).is_empty());
    }

    #[test]
    fn start_options_deserialize() {
        let opts: StartOptions = toml::from_str(
            r#"
            extra_args = ["--wallet.totalAccounts", "3"]
            [fork]
            network = "goerli"
            "#,
        )
        .unwrap();
        assert_eq!(opts.extra_args.len(), 2);
        assert_eq!(opts.fork.unwrap().network.as_deref(), Some("goerli"));
    }
}
