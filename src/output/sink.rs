//! # Per-port output capture.
//!
//! [`OutputSink`] owns the reader tasks draining a child's stdout and stderr.
//! Each line is emitted as a `tracing` event (target `nodevisor::output`,
//! fields `port` and `stream`) and appended to the node's [`OutputChannel`].
//!
//! ```text
//! child.stdout ──► reader(stdout) ──┐
//!                                   ├──► Shared { open? } ──► channel.append_line()
//! child.stderr ──► reader(stderr) ──┘
//!
//! dispose(): cancel readers ──► close gate ──► channel.dispose()  (once)
//! ```
//!
//! The gate guarantees that no line reaches the channel after it was disposed.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::select;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::output::OutputChannel;
use crate::port::PortKey;

/// Boxed child output stream.
pub type OutputStream = Box<dyn AsyncRead + Send + Unpin>;

/// Which child stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl StreamKind {
    /// Short label used in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

struct Shared {
    channel: Arc<dyn OutputChannel>,
    open: Mutex<bool>,
}

impl Shared {
    fn forward(&self, port: PortKey, stream: StreamKind, line: &str) {
        let open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        if !*open {
            return;
        }
        trace!(target: "nodevisor::output", %port, stream = stream.as_str(), "{line}");
        self.channel.append_line(line);
    }

    /// Closes the gate; returns true for the call that actually closed it.
    fn close(&self) -> bool {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *open, false)
    }
}

/// Live forwarding of one child's output into its channel.
pub struct OutputSink {
    port: PortKey,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    readers: Vec<JoinHandle<()>>,
}

impl OutputSink {
    /// Starts forwarding `stdout` and `stderr` (either may be absent) into `channel`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach(
        port: PortKey,
        stdout: Option<OutputStream>,
        stderr: Option<OutputStream>,
        channel: Arc<dyn OutputChannel>,
    ) -> Self {
        let shared = Arc::new(Shared {
            channel,
            open: Mutex::new(true),
        });
        let cancel = CancellationToken::new();

        let readers = [(stdout, StreamKind::Stdout), (stderr, StreamKind::Stderr)]
            .into_iter()
            .filter_map(|(stream, kind)| {
                stream.map(|s| spawn_reader(s, kind, port, shared.clone(), cancel.child_token()))
            })
            .collect();

        Self {
            port,
            shared,
            cancel,
            readers,
        }
    }

    /// Port this sink belongs to.
    pub fn port(&self) -> PortKey {
        self.port
    }

    /// Returns true once [`dispose`](Self::dispose) ran.
    pub fn is_disposed(&self) -> bool {
        !*self.shared.open.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stops the readers and disposes the channel. Idempotent.
    pub fn dispose(&mut self) {
        self.cancel.cancel();
        for reader in self.readers.drain(..) {
            reader.abort();
        }
        if self.shared.close() {
            self.shared.channel.dispose();
            debug!(port = %self.port, "output sink disposed");
        }
    }
}

impl Drop for OutputSink {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn spawn_reader(
    stream: OutputStream,
    kind: StreamKind,
    port: PortKey,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            let next = select! {
                biased;
                _ = cancel.cancelled() => break,
                next = lines.next_line() => next,
            };
            match next {
                Ok(Some(line)) => shared.forward(port, kind, &line),
                Ok(None) => break,
                Err(e) => {
                    debug!(%port, stream = kind.as_str(), error = %e, "output stream read failed");
                    break;
                }
            }
        }
    })
}
