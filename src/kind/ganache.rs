//! # Ganache.
//!
//! Launched as `npx ganache --port <port>` plus fork flags; recognized by
//! `net_listening` returning `true`.

use std::sync::Arc;

use crate::kind::{fork_flags, npx, NodeKind, StartOptions};
use crate::port::PortKey;
use crate::probe::{JsonRpcProbe, LivenessProbe, ProbeSettings};
use crate::process::SpawnCommand;

/// Ganache development chain, fork-capable.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ganache;

impl NodeKind for Ganache {
    fn name(&self) -> &str {
        "ganache"
    }

    fn display_name(&self) -> &str {
        "Ganache"
    }

    fn command(&self, port: PortKey, options: &StartOptions) -> SpawnCommand {
        let mut cmd = SpawnCommand::new(npx())
            .arg("ganache")
            .args(["--port".to_string(), port.to_string()]);
        if let Some(fork) = &options.fork {
            cmd = cmd.args(fork_flags(fork));
        }
        cmd.args(options.extra_args.iter().cloned())
    }

    fn liveness(&self, settings: ProbeSettings) -> Arc<dyn LivenessProbe> {
        Arc::new(JsonRpcProbe::net_listening(settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::ForkOptions;

    #[test]
    fn command_with_fork_and_extra_args() {
        let opts = StartOptions {
            fork: Some(ForkOptions {
                url: None,
                network: Some("mainnet".into()),
                block_number: 0,
            }),
            extra_args: vec!["--quiet".into()],
        };
        let cmd = Ganache.command(PortKey::new(8545).unwrap(), &opts);
        assert_eq!(
            cmd.args,
            vec!["ganache", "--port", "8545", "--fork.network", "mainnet", "--quiet"]
        );
    }

    #[test]
    fn plain_command() {
        let cmd = Ganache.command(PortKey::new(7545).unwrap(), &StartOptions::default());
        assert_eq!(cmd.args, vec!["ganache", "--port", "7545"]);
    }
}
