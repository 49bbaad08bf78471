//! HTTP client for node management agents.
//!
//! One authenticated `GET {scheme}://{fqdn}:{port}/api/{endpoint}` per node
//! per cycle. The agent answers with a JSON array of workloads; every field
//! we read defaults to zero unless it holds a usable number.

use std::future::Future;
use std::time::Duration;

use fleetpanel_core::{ConfigError, PollerConfig};
use fleetpanel_state::NodeRecord;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, warn};

use crate::credentials::{CredentialProvider, RecordCredentials};
use crate::error::{FetchFailure, TelemetryError};
use crate::types::WorkloadUtilization;

/// Anything that can produce a node's workload utilization.
///
/// The poller is generic over this so tests can substitute canned results.
pub trait TelemetrySource: Send + Sync + 'static {
    fn fetch(
        &self,
        node: &NodeRecord,
    ) -> impl Future<Output = Result<Vec<WorkloadUtilization>, FetchFailure>> + Send;
}

/// Settings for [`TelemetryClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout: Duration,
    pub endpoint: String,
    pub accept_invalid_certs: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            endpoint: "servers".to_string(),
            accept_invalid_certs: false,
        }
    }
}

impl ClientOptions {
    pub fn from_config(config: &PollerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            timeout: config.request_timeout()?,
            endpoint: config.endpoint.clone(),
            accept_invalid_certs: config.accept_invalid_certs,
        })
    }
}

/// Fetches workload utilization from node agents.
#[derive(Clone)]
pub struct TelemetryClient<C = RecordCredentials> {
    http: reqwest::Client,
    credentials: C,
    endpoint: String,
    timeout: Duration,
}

impl<C: CredentialProvider> TelemetryClient<C> {
    pub fn new(options: ClientOptions, credentials: C) -> Result<Self, TelemetryError> {
        if options.accept_invalid_certs {
            warn!("TLS certificate verification is disabled for node agent requests");
        }
        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .connect_timeout(options.timeout)
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .build()
            .map_err(|e| {
                TelemetryError::Configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            credentials,
            endpoint: options.endpoint.trim_matches('/').to_string(),
            timeout: options.timeout,
        })
    }

    /// Agent URL for `node`.
    pub fn url_for(&self, node: &NodeRecord) -> Result<reqwest::Url, TelemetryError> {
        let raw = format!("{}/api/{}", node.connection_address(), self.endpoint);
        reqwest::Url::parse(&raw)
            .map_err(|e| TelemetryError::Configuration(format!("invalid agent URL {raw:?}: {e}")))
    }

    /// Fetch the workload list of one node.
    pub async fn fetch(&self, node: &NodeRecord) -> Result<Vec<WorkloadUtilization>, FetchFailure> {
        self.try_fetch(node)
            .await
            .map_err(|cause| FetchFailure::new(node.id, cause))
    }

    async fn try_fetch(
        &self,
        node: &NodeRecord,
    ) -> Result<Vec<WorkloadUtilization>, TelemetryError> {
        let url = self.url_for(node)?;
        let token = self.credentials.bearer_token(node)?;

        debug!(node_id = node.id, %url, "requesting agent telemetry");

        let response = self
            .http
            .get(url)
            .bearer_auth(token.expose_secret())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TelemetryError::Protocol(format!("agent returned HTTP {status}")));
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        let workloads: Vec<Option<AgentWorkload>> = serde_json::from_slice(&body)
            .map_err(|e| TelemetryError::Protocol(format!("malformed agent response: {e}")))?;

        Ok(workloads
            .into_iter()
            .flatten()
            .map(AgentWorkload::into_utilization)
            .collect())
    }

    fn classify(&self, err: reqwest::Error) -> TelemetryError {
        let err = err.without_url();
        if err.is_timeout() {
            TelemetryError::Transport(format!("request timed out after {:?}", self.timeout))
        } else if err.is_builder() {
            TelemetryError::Configuration(err.to_string())
        } else if err.is_decode() {
            TelemetryError::Protocol(err.to_string())
        } else {
            TelemetryError::Transport(err.to_string())
        }
    }
}

impl<C: CredentialProvider> TelemetrySource for TelemetryClient<C> {
    fn fetch(
        &self,
        node: &NodeRecord,
    ) -> impl Future<Output = Result<Vec<WorkloadUtilization>, FetchFailure>> + Send {
        Self::fetch(self, node)
    }
}

// ── Agent wire format ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AgentWorkload {
    configuration: Option<AgentConfiguration>,
    utilization: Option<AgentUtilization>,
}

#[derive(Debug, Deserialize)]
struct AgentConfiguration {
    #[serde(default, deserialize_with = "lenient_string")]
    uuid: String,
    build: Option<AgentBuild>,
}

#[derive(Debug, Deserialize)]
struct AgentBuild {
    #[serde(default, deserialize_with = "lenient_u64")]
    disk_space: u64,
}

#[derive(Debug, Deserialize)]
struct AgentUtilization {
    #[serde(default, deserialize_with = "lenient_u64")]
    memory_bytes: u64,
    #[serde(default, deserialize_with = "lenient_f64")]
    cpu_absolute: f64,
    #[serde(default, deserialize_with = "lenient_u64")]
    disk_bytes: u64,
}

impl AgentWorkload {
    fn into_utilization(self) -> WorkloadUtilization {
        let (workload_id, disk_budget_mb) = match self.configuration {
            Some(c) => (c.uuid, c.build.map_or(0, |b| b.disk_space)),
            None => (String::new(), 0),
        };
        let (memory_bytes, cpu_percent, disk_bytes) = match self.utilization {
            Some(u) => (u.memory_bytes, u.cpu_absolute, u.disk_bytes),
            None => (0, 0.0, 0),
        };
        WorkloadUtilization {
            workload_id,
            memory_bytes,
            disk_bytes,
            cpu_percent,
            disk_budget_mb,
        }
    }
}

// Agents of different versions disagree on number shapes. A field we
// cannot read as a number counts as zero instead of failing the node.

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_i64().map(|_| 0))
            // `as` saturates and maps NaN to zero.
            .or_else(|| n.as_f64().map(|f| f as u64))
            .unwrap_or(0),
        _ => 0,
    })
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()).unwrap_or(0.0),
        _ => 0.0,
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use fleetpanel_state::{DaemonToken, Scheme};

    fn node_at(port: u16, token: &str) -> NodeRecord {
        NodeRecord {
            id: 5,
            name: "local".to_string(),
            description: None,
            fqdn: "127.0.0.1".to_string(),
            scheme: Scheme::Http,
            daemon_listen: port,
            behind_proxy: false,
            memory_mb: 1024,
            memory_overallocate: 0,
            disk_mb: 1024,
            disk_overallocate: 0,
            public: true,
            maintenance_mode: false,
            daemon_token_id: "id".to_string(),
            daemon_token: DaemonToken::new(token),
            sum_memory_mb: 0,
            sum_disk_mb: 0,
        }
    }

    /// Serve `router` on an ephemeral port and return the port.
    async fn spawn_agent(router: Router) -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        port
    }

    fn client(timeout: Duration) -> TelemetryClient {
        TelemetryClient::new(
            ClientOptions {
                timeout,
                ..ClientOptions::default()
            },
            RecordCredentials,
        )
        .unwrap()
    }

    const BODY: &str = r#"[
        {
            "configuration": {"uuid": "srv-a", "build": {"disk_space": 2048}},
            "utilization": {"memory_bytes": 1048576, "cpu_absolute": 12.5, "disk_bytes": 4096}
        },
        {
            "configuration": {"uuid": "srv-b", "build": null},
            "utilization": {"memory_bytes": null, "cpu_absolute": 3.0}
        },
        {}
    ]"#;

    #[tokio::test]
    async fn fetches_and_parses_workloads() {
        let router = Router::new().route(
            "/api/servers",
            get(|headers: HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                if auth != "Bearer s3cret" {
                    return (StatusCode::UNAUTHORIZED, String::new());
                }
                (StatusCode::OK, BODY.to_string())
            }),
        );
        let port = spawn_agent(router).await;

        let workloads = client(Duration::from_secs(5))
            .fetch(&node_at(port, "s3cret"))
            .await
            .unwrap();

        assert_eq!(workloads.len(), 3);
        assert_eq!(workloads[0].workload_id, "srv-a");
        assert_eq!(workloads[0].memory_bytes, 1_048_576);
        assert_eq!(workloads[0].cpu_percent, 12.5);
        assert_eq!(workloads[0].disk_bytes, 4096);
        assert_eq!(workloads[0].disk_budget_mb, 2048);
        assert_eq!(workloads[1].memory_bytes, 0);
        assert_eq!(workloads[1].disk_budget_mb, 0);
        assert_eq!(workloads[2], WorkloadUtilization::default());
    }

    const MIXED_BODY: &str = r#"[
        {
            "configuration": {"uuid": "srv-a", "build": {"disk_space": 1024}},
            "utilization": {"memory_bytes": 1048576, "cpu_absolute": 4, "disk_bytes": 100}
        },
        {
            "configuration": {"uuid": 77, "build": {"disk_space": "512"}},
            "utilization": {"memory_bytes": 2097152.0, "cpu_absolute": "high", "disk_bytes": -5}
        }
    ]"#;

    #[tokio::test]
    async fn odd_number_shapes_do_not_fail_the_node() {
        let router = Router::new().route("/api/servers", get(|| async { MIXED_BODY }));
        let port = spawn_agent(router).await;

        let workloads = client(Duration::from_secs(5))
            .fetch(&node_at(port, "t"))
            .await
            .unwrap();

        assert_eq!(workloads.len(), 2);
        assert_eq!(workloads[0].memory_bytes, 1_048_576);
        assert_eq!(workloads[0].cpu_percent, 4.0);
        assert_eq!(workloads[0].disk_budget_mb, 1024);
        assert_eq!(workloads[1].workload_id, "77");
        assert_eq!(workloads[1].memory_bytes, 2_097_152);
        assert_eq!(workloads[1].cpu_percent, 0.0);
        assert_eq!(workloads[1].disk_bytes, 0);
        assert_eq!(workloads[1].disk_budget_mb, 0);
    }

    #[tokio::test]
    async fn non_success_status_is_protocol_error() {
        let router = Router::new().route(
            "/api/servers",
            get(|| async { (StatusCode::UNAUTHORIZED, "nope") }),
        );
        let port = spawn_agent(router).await;

        let failure = client(Duration::from_secs(5))
            .fetch(&node_at(port, "wrong"))
            .await
            .unwrap_err();
        assert_eq!(failure.node_id, 5);
        assert!(matches!(failure.cause, TelemetryError::Protocol(_)));
    }

    #[tokio::test]
    async fn malformed_body_is_protocol_error() {
        let router = Router::new().route("/api/servers", get(|| async { "{not json" }));
        let port = spawn_agent(router).await;

        let failure = client(Duration::from_secs(5))
            .fetch(&node_at(port, "t"))
            .await
            .unwrap_err();
        assert!(matches!(failure.cause, TelemetryError::Protocol(_)));
    }

    #[tokio::test]
    async fn slow_agent_is_transport_timeout() {
        let router = Router::new().route(
            "/api/servers",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "[]"
            }),
        );
        let port = spawn_agent(router).await;

        let failure = client(Duration::from_millis(100))
            .fetch(&node_at(port, "t"))
            .await
            .unwrap_err();
        assert!(matches!(failure.cause, TelemetryError::Transport(_)));
        assert!(failure.cause.is_retryable());
    }

    #[tokio::test]
    async fn refused_connection_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let failure = client(Duration::from_secs(2))
            .fetch(&node_at(port, "t"))
            .await
            .unwrap_err();
        assert!(matches!(failure.cause, TelemetryError::Transport(_)));
    }

    #[tokio::test]
    async fn missing_token_fails_before_any_request() {
        let failure = client(Duration::from_secs(1))
            .fetch(&node_at(1, ""))
            .await
            .unwrap_err();
        assert!(matches!(failure.cause, TelemetryError::Configuration(_)));
    }

    #[test]
    fn url_uses_configured_endpoint() {
        let c = TelemetryClient::new(
            ClientOptions {
                endpoint: "/servers/".to_string(),
                ..ClientOptions::default()
            },
            RecordCredentials,
        )
        .unwrap();
        let mut node = node_at(8080, "t");
        node.scheme = Scheme::Https;
        node.fqdn = "node1.example.com".to_string();
        assert_eq!(
            c.url_for(&node).unwrap().as_str(),
            "https://node1.example.com:8080/api/servers"
        );
    }
}
