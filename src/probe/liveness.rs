//! # Protocol-level liveness probes.
//!
//! A [`LivenessProbe`] confirms that whatever listens on a port is our kind of
//! node and ready to serve. Two shapes exist:
//!
//! - [`JsonRpcProbe`]: `POST http://<host>:<port>` with
//!   `{"id":1,"jsonrpc":"2.0","method":"<method>","params":[]}`; the response
//!   must carry a `result` accepted by the configured [`RpcExpectation`] and no `error`.
//! - [`HttpGetProbe`]: `GET http://<host>:<port><path>`; the status must be 200.
//!
//! Connection refusals, timeouts and malformed bodies are all plain failures
//! ([`ProbeFailure`]); nothing here is meant to reach the supervisor's caller.
//! A request that outlives [`ProbeSettings::timeout`], or a probe that outlives
//! the caller's limit in [`bounded`], is a [`ProbeFailure::Timeout`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::port::PortKey;

/// Why a probe did not succeed.
#[derive(Error, Debug)]
pub enum ProbeFailure {
    /// Connection refused or reset.
    #[error("request failed: {0}")]
    Transport(String),

    /// The server answered with an unexpected HTTP status.
    #[error("unexpected status {0}")]
    Status(u16),

    /// The body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Shape(String),

    /// The probe did not complete within its deadline.
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for ProbeFailure {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            ProbeFailure::Shape(value.to_string())
        } else {
            ProbeFailure::Transport(value.to_string())
        }
    }
}

/// Runs one probe, failing with [`ProbeFailure::Timeout`] once `limit` elapses.
pub(crate) async fn bounded(
    probe: &dyn LivenessProbe,
    port: PortKey,
    limit: Duration,
) -> Result<(), ProbeFailure> {
    tokio::time::timeout(limit, probe.probe(port))
        .await
        .unwrap_or(Err(ProbeFailure::Timeout(limit)))
}

/// Checks whether a listener on a port is a live node of the expected kind.
#[async_trait]
pub trait LivenessProbe: Send + Sync + 'static {
    /// Probes `port` once.
    async fn probe(&self, port: PortKey) -> Result<(), ProbeFailure>;
}

/// Host and per-request timeout shared by the built-in probes.
#[derive(Clone, Debug)]
pub struct ProbeSettings {
    /// Host the nodes listen on.
    pub host: String,
    /// Limit for a single request.
    pub timeout: Duration,
}

impl ProbeSettings {
    fn url(&self, port: PortKey, path: &str) -> String {
        format!("http://{}:{}{}", self.host, port, path)
    }

    fn failure(&self, err: reqwest::Error) -> ProbeFailure {
        if err.is_timeout() {
            ProbeFailure::Timeout(self.timeout)
        } else {
            err.into()
        }
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            timeout: Duration::from_secs(2),
        }
    }
}

/// Acceptance rule for the `result` member of a JSON-RPC response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RpcExpectation {
    /// `result` must be the boolean `true` (e.g. `net_listening`).
    True,
    /// `result` must be a non-empty string (e.g. `web3_clientVersion`).
    NonEmptyString,
}

impl RpcExpectation {
    fn accepts(self, result: &Value) -> bool {
        match self {
            RpcExpectation::True => result.as_bool() == Some(true),
            RpcExpectation::NonEmptyString => result.as_str().is_some_and(|s| !s.is_empty()),
        }
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// JSON-RPC liveness probe.
#[derive(Clone, Debug)]
pub struct JsonRpcProbe {
    client: reqwest::Client,
    settings: ProbeSettings,
    method: &'static str,
    expect: RpcExpectation,
}

impl JsonRpcProbe {
    /// Creates a probe calling `method` and applying `expect` to its result.
    pub fn new(settings: ProbeSettings, method: &'static str, expect: RpcExpectation) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
            method,
            expect,
        }
    }

    /// `net_listening` must return `true`.
    pub fn net_listening(settings: ProbeSettings) -> Self {
        Self::new(settings, "net_listening", RpcExpectation::True)
    }

    /// `web3_clientVersion` must return a version string.
    pub fn client_version(settings: ProbeSettings) -> Self {
        Self::new(settings, "web3_clientVersion", RpcExpectation::NonEmptyString)
    }

    /// The request body sent by this probe.
    pub fn request_body(&self) -> Value {
        json!({ "id": 1, "jsonrpc": "2.0", "method": self.method, "params": [] })
    }
}

#[async_trait]
impl LivenessProbe for JsonRpcProbe {
    async fn probe(&self, port: PortKey) -> Result<(), ProbeFailure> {
        let response = self
            .client
            .post(self.settings.url(port, ""))
            .timeout(self.settings.timeout)
            .json(&self.request_body())
            .send()
            .await
            .map_err(|e| self.settings.failure(e))?;

        if !response.status().is_success() {
            return Err(ProbeFailure::Status(response.status().as_u16()));
        }

        let body: RpcResponse = response.json().await.map_err(|e| self.settings.failure(e))?;
        if let Some(error) = body.error {
            return Err(ProbeFailure::Shape(format!("{} returned error {error}", self.method)));
        }
        match body.result {
            Some(result) if self.expect.accepts(&result) => Ok(()),
            Some(result) => Err(ProbeFailure::Shape(format!(
                "{} returned {result}",
                self.method
            ))),
            None => Err(ProbeFailure::Shape(format!("{} returned no result", self.method))),
        }
    }
}

/// Plain HTTP GET probe expecting status 200.
#[derive(Clone, Debug)]
pub struct HttpGetProbe {
    client: reqwest::Client,
    settings: ProbeSettings,
    path: String,
}

impl HttpGetProbe {
    /// Creates a probe for `path` (must start with `/`).
    pub fn new(settings: ProbeSettings, path: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
            path: path.into(),
        }
    }
}

#[async_trait]
impl LivenessProbe for HttpGetProbe {
    async fn probe(&self, port: PortKey) -> Result<(), ProbeFailure> {
        let response = self
            .client
            .get(self.settings.url(port, &self.path))
            .timeout(self.settings.timeout)
            .send()
            .await
            .map_err(|e| self.settings.failure(e))?;

        match response.status().as_u16() {
            200 => Ok(()),
            other => Err(ProbeFailure::Status(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves `responses` to consecutive connections with a canned HTTP reply each.
    async fn serve(responses: Vec<(u16, &'static str)>) -> PortKey {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = PortKey::new(listener.local_addr().unwrap().port()).unwrap();

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut sock, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 4096];
                let _ = sock.read(&mut buf).await;
                let reply = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = sock.write_all(reply.as_bytes()).await;
                let _ = sock.shutdown().await;
            }
        });
        port
    }

    /// Accepts connections and never answers.
    async fn silent() -> PortKey {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = PortKey::new(listener.local_addr().unwrap().port()).unwrap();
        tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((sock, _)) = listener.accept().await {
                open.push(sock);
            }
        });
        port
    }

    async fn unused_port() -> PortKey {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        PortKey::new(port).unwrap()
    }

    #[tokio::test]
    async fn net_listening_accepts_true() {
        let port = serve(vec![(200, r#"{"id":1,"jsonrpc":"2.0","result":true}"#)]).await;
        let probe = JsonRpcProbe::net_listening(ProbeSettings::default());
        probe.probe(port).await.unwrap();
    }

    #[tokio::test]
    async fn net_listening_rejects_other_shapes() {
        let port = serve(vec![
            (200, r#"{"id":1,"jsonrpc":"2.0","result":false}"#),
            (200, r#"{"id":1,"jsonrpc":"2.0","error":{"code":-32601}}"#),
            (200, "not json"),
            (500, "{}"),
        ])
        .await;
        let probe = JsonRpcProbe::net_listening(ProbeSettings::default());

        assert!(matches!(probe.probe(port).await, Err(ProbeFailure::Shape(_))));
        assert!(matches!(probe.probe(port).await, Err(ProbeFailure::Shape(_))));
        assert!(matches!(probe.probe(port).await, Err(ProbeFailure::Shape(_))));
        assert!(matches!(probe.probe(port).await, Err(ProbeFailure::Status(500))));
    }

    #[tokio::test]
    async fn client_version_requires_string() {
        let port = serve(vec![
            (200, r#"{"id":1,"jsonrpc":"2.0","result":"Geth/v1.13"}"#),
            (200, r#"{"id":1,"jsonrpc":"2.0","result":""}"#),
        ])
        .await;
        let probe = JsonRpcProbe::client_version(ProbeSettings::default());

        probe.probe(port).await.unwrap();
        assert!(probe.probe(port).await.is_err());
    }

    #[tokio::test]
    async fn http_get_requires_200() {
        let port = serve(vec![(200, "ok"), (404, "missing")]).await;
        let probe = HttpGetProbe::new(ProbeSettings::default(), "/");

        probe.probe(port).await.unwrap();
        assert!(matches!(probe.probe(port).await, Err(ProbeFailure::Status(404))));
    }

    #[tokio::test]
    async fn connection_refused_is_a_failure_not_a_panic() {
        let port = unused_port().await;
        let probe = JsonRpcProbe::net_listening(ProbeSettings::default());
        assert!(matches!(probe.probe(port).await, Err(ProbeFailure::Transport(_))));
    }

    #[tokio::test]
    async fn unanswered_request_times_out() {
        let port = silent().await;
        let settings = ProbeSettings {
            timeout: Duration::from_millis(100),
            ..ProbeSettings::default()
        };

        let rpc = JsonRpcProbe::net_listening(settings.clone());
        assert!(matches!(
            rpc.probe(port).await,
            Err(ProbeFailure::Timeout(t)) if t == Duration::from_millis(100)
        ));
        let get = HttpGetProbe::new(settings, "/");
        assert!(matches!(get.probe(port).await, Err(ProbeFailure::Timeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_reports_the_limit() {
        struct Hangs;

        #[async_trait]
        impl LivenessProbe for Hangs {
            async fn probe(&self, _port: PortKey) -> Result<(), ProbeFailure> {
                std::future::pending().await
            }
        }

        let port = PortKey::new(8545).unwrap();
        let res = bounded(&Hangs, port, Duration::from_secs(2)).await;
        assert!(matches!(res, Err(ProbeFailure::Timeout(t)) if t == Duration::from_secs(2)));
    }

    #[test]
    fn request_body_shape() {
        let probe = JsonRpcProbe::client_version(ProbeSettings::default());
        assert_eq!(
            probe.request_body(),
            json!({"id":1,"jsonrpc":"2.0","method":"web3_clientVersion","params":[]})
        );
    }
}
