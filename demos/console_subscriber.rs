//! # Demo: console_subscriber
//!
//! Starts (or attaches to) a Ganache node and prints lifecycle events.
//!
//! Shows how to:
//! - Implement the [`Subscribe`] trait.
//! - Pass fork options through [`StartOptions`].
//! - Capture node output with [`MemoryChannels`].
//! - Shut everything down on Ctrl-C with [`NodeSupervisor::run_until_signal`].
//!
//! ## Run
//! ```bash
//! FORK_URL=https://rpc.example cargo run --example console_subscriber -- 8545
//! ```

use std::sync::Arc;

use nodevisor::{
    Event, EventKind, ForkOptions, Ganache, MemoryChannels, NodeSupervisor, StartOptions,
    Subscribe, SupervisorConfig,
};

struct ConsoleSubscriber;

#[async_trait::async_trait]
impl Subscribe for ConsoleSubscriber {
    async fn on_event(&self, ev: &Event) {
        let port = ev.port.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
        match ev.kind {
            EventKind::ReadinessProbeFailed => println!(
                "[sub] port={port} probe attempt {} failed, next in {}ms",
                ev.attempt.unwrap_or(0),
                ev.delay_ms.unwrap_or(0)
            ),
            EventKind::NodeReady | EventKind::NodeAttached => {
                println!("[sub] port={port} {} pid={:?}", ev.kind.as_label(), ev.pid)
            }
            EventKind::StartFailed | EventKind::NodeExited | EventKind::KillFailed => println!(
                "[sub] port={port} {}: {}",
                ev.kind.as_label(),
                ev.reason.as_deref().unwrap_or("<unknown>")
            ),
            _ => println!("[sub] port={port} {}", ev.kind.as_label()),
        }
    }

    fn name(&self) -> &'static str {
        "console"
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("nodevisor=debug").init();

    let port = std::env::args().nth(1).unwrap_or_else(|| "8545".into());
    let options = match std::env::var("FORK_URL") {
        Ok(url) => StartOptions::forked(ForkOptions {
            url: Some(url),
            ..ForkOptions::default()
        }),
        Err(_) => StartOptions::default(),
    };

    let channels = Arc::new(MemoryChannels::new());
    let sup = NodeSupervisor::builder(SupervisorConfig::default(), Arc::new(Ganache))
        .with_subscribers(vec![Arc::new(ConsoleSubscriber)])
        .with_channels(channels.clone())
        .build();

    let node = sup.start(port.as_str(), &options).await?;
    println!("{} node on {} ({:?})", sup.kind().display_name(), node.url, node.ownership);

    let report = sup.run_until_signal().await?;
    println!("disposed {} node(s), {} failure(s)", report.attempted, report.failures.len());
    for name in channels.names() {
        let lines = channels.channel(&name).map(|c| c.lines().len()).unwrap_or(0);
        println!("{name}: {lines} captured line(s)");
    }
    Ok(())
}
