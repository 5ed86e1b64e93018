//! # Truffle Dashboard.
//!
//! Launched as `npx truffle dashboard --port <port> --no-auto-open`; recognized
//! by `GET /` answering 200.

use std::sync::Arc;

use crate::kind::{npx, NodeKind, StartOptions};
use crate::port::PortKey;
use crate::probe::{HttpGetProbe, LivenessProbe, ProbeSettings};
use crate::process::SpawnCommand;

/// Truffle dashboard. Fork options are ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct Dashboard;

impl NodeKind for Dashboard {
    fn name(&self) -> &str {
        "dashboard"
    }

    fn display_name(&self) -> &str {
        "Truffle Dashboard"
    }

    fn command(&self, port: PortKey, options: &StartOptions) -> SpawnCommand {
        SpawnCommand::new(npx())
            .args(["truffle", "dashboard", "--port"])
            .arg(port.to_string())
            .arg("--no-auto-open")
            .args(options.extra_args.iter().cloned())
    }

    fn liveness(&self, settings: ProbeSettings) -> Arc<dyn LivenessProbe> {
        Arc::new(HttpGetProbe::new(settings, "/"))
    }
}
