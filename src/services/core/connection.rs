use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

use crate::backends::plex::api::AuthHeaderProvider;
use crate::models::PlexConnection;

/// Lightweight per-server endpoint used to confirm reachability
pub const IDENTITY_PATH: &str = "/identity";

/// Result of probing a single connection. Routine failures are values, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reachable { latency_ms: u64 },
    /// The endpoint answered 401/403
    AuthRequired,
    /// Non-2xx, transport error, or timeout
    Unreachable,
}

impl ProbeOutcome {
    pub fn latency_ms(&self) -> Option<u64> {
        match self {
            ProbeOutcome::Reachable { latency_ms } => Some(*latency_ms),
            _ => None,
        }
    }

    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeOutcome::Reachable { .. })
    }
}

/// Probes one connection endpoint. Implementations never fail.
#[async_trait]
pub trait ConnectionProbe: Send + Sync {
    async fn test(&self, connection: &PlexConnection) -> ProbeOutcome;
}

/// Probes `GET {uri}/identity` with the current auth headers and a hard timeout
pub struct ConnectionTester {
    client: reqwest::Client,
    auth: Arc<dyn AuthHeaderProvider>,
    timeout: Duration,
}

impl ConnectionTester {
    pub fn new(auth: Arc<dyn AuthHeaderProvider>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            auth,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn identity_url(uri: &str) -> Option<Url> {
        Url::parse(uri).ok()?.join(IDENTITY_PATH).ok()
    }
}

#[async_trait]
impl ConnectionProbe for ConnectionTester {
    async fn test(&self, connection: &PlexConnection) -> ProbeOutcome {
        let Some(url) = Self::identity_url(&connection.uri) else {
            debug!("Cannot build identity URL for {}", connection.uri);
            return ProbeOutcome::Unreachable;
        };

        let started = Instant::now();
        let request = self
            .client
            .get(url)
            .headers(self.auth.auth_headers())
            .send();

        // Dropping the in-flight request on timeout aborts it
        let response = match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                debug!("✗ {} failed: {}", connection.uri, e.without_url());
                return ProbeOutcome::Unreachable;
            }
            Err(_) => {
                debug!(
                    "✗ {} timed out after {:?}, request aborted",
                    connection.uri, self.timeout
                );
                return ProbeOutcome::Unreachable;
            }
        };

        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                debug!("✗ {} requires authentication ({})", connection.uri, status);
                ProbeOutcome::AuthRequired
            }
            s if s.is_success() => {
                let latency_ms = started.elapsed().as_millis() as u64;
                debug!("✓ {} responded in {}ms", connection.uri, latency_ms);
                ProbeOutcome::Reachable { latency_ms }
            }
            _ => {
                debug!("✗ {} returned status {}", connection.uri, status);
                ProbeOutcome::Unreachable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::plex::api::StaticTokenAuth;
    use crate::models::Protocol;
    use mockito::Server;
    use serde_json::json;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn tester(timeout: Duration) -> ConnectionTester {
        ConnectionTester::new(Arc::new(StaticTokenAuth::new("test_token")), timeout).unwrap()
    }

    fn connection(uri: &str) -> PlexConnection {
        PlexConnection {
            uri: uri.to_string(),
            protocol: Protocol::Http,
            address: "127.0.0.1".to_string(),
            port: 0,
            local: true,
            relay: false,
            latency_ms: None,
        }
    }

    #[test]
    fn test_identity_url() {
        assert_eq!(
            ConnectionTester::identity_url("https://10-0-0-2.x.plex.direct:32400")
                .unwrap()
                .as_str(),
            "https://10-0-0-2.x.plex.direct:32400/identity"
        );
        assert!(ConnectionTester::identity_url("not a uri").is_none());
    }

    #[tokio::test]
    async fn test_reachable_connection_reports_latency() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/identity")
            .match_header("X-Plex-Token", "test_token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"MediaContainer": {"machineIdentifier": "srv1", "version": "1.40.0"}}).to_string())
            .create_async()
            .await;

        let outcome = tester(Duration::from_secs(5))
            .test(&connection(&server.url()))
            .await;

        assert!(outcome.is_reachable());
        assert!(outcome.latency_ms().is_some());
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthorized_reports_auth_required() {
        for status in [401, 403] {
            let mut server = Server::new_async().await;
            let _m = server
                .mock("GET", "/identity")
                .with_status(status)
                .create_async()
                .await;

            let outcome = tester(Duration::from_secs(5))
                .test(&connection(&server.url()))
                .await;
            assert_eq!(outcome, ProbeOutcome::AuthRequired);
        }
    }

    #[tokio::test]
    async fn test_server_error_is_unreachable() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/identity")
            .with_status(500)
            .create_async()
            .await;

        let outcome = tester(Duration::from_secs(5))
            .test(&connection(&server.url()))
            .await;
        assert_eq!(outcome, ProbeOutcome::Unreachable);
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        // Bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let outcome = tester(Duration::from_secs(5))
            .test(&connection(&format!("http://{}", addr)))
            .await;
        assert_eq!(outcome, ProbeOutcome::Unreachable);
    }

    #[tokio::test]
    async fn test_timeout_aborts_request() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Accept, never answer, and report when the client hangs up
        let hangup = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => return true,
                    Ok(_) => continue,
                }
            }
        });

        let started = Instant::now();
        let outcome = tester(Duration::from_millis(300))
            .test(&connection(&format!("http://{}", addr)))
            .await;

        assert_eq!(outcome, ProbeOutcome::Unreachable);
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(started.elapsed() < Duration::from_secs(5));

        let closed = tokio::time::timeout(Duration::from_secs(5), hangup)
            .await
            .expect("client connection was not closed after the timeout")
            .unwrap();
        assert!(closed);
    }
}
