//! REST API handlers.
//!
//! Telemetry handlers read the latest published snapshot and never wait on
//! an in-flight poll. Capacity handlers read the inventory via `StateStore`.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use fleetpanel_placement::{Headroom, ViabilityError, headroom, is_viable, viable_nodes};
use fleetpanel_state::{NodeId, NodeRecord, Scheme};
use fleetpanel_telemetry::{CycleOutcome, TelemetrySource, project, render_prometheus};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn viability_error_response(err: &ViabilityError) -> axum::response::Response {
    let status = match err {
        ViabilityError::NegativeRequest { .. } => StatusCode::BAD_REQUEST,
        ViabilityError::InvalidNode { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    };
    error_response(&err.to_string(), status).into_response()
}

// ── Dashboard ──────────────────────────────────────────────────

/// GET /admin/nodes/metrics
///
/// Bare array, polled by the dashboard every few seconds.
pub async fn node_metrics<F: TelemetrySource>(
    State(state): State<ApiState<F>>,
) -> impl IntoResponse {
    let latest = state.poller.snapshots().latest();
    Json(project(&latest))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshSummary {
    pub cycle: u64,
    pub nodes: usize,
    pub online: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
}

/// POST /admin/nodes/metrics/refresh
///
/// Runs a full cycle before answering; `409` while another one is in flight.
pub async fn refresh_metrics<F: TelemetrySource>(
    State(state): State<ApiState<F>>,
) -> impl IntoResponse {
    match state.poller.refresh().await {
        Ok(CycleOutcome::Completed(report)) => {
            let summary = RefreshSummary {
                cycle: report.snapshot.cycle,
                nodes: report.snapshot.len(),
                online: report.snapshot.online_count(),
                failed: report.failed(),
                elapsed_ms: report.elapsed.as_millis() as u64,
            };
            info!(cycle = summary.cycle, "on-demand poll cycle completed");
            (StatusCode::OK, ApiResponse::ok(summary)).into_response()
        }
        Ok(CycleOutcome::Skipped) => {
            error_response("a poll cycle is already in flight", StatusCode::CONFLICT)
                .into_response()
        }
        Err(e) => {
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
        }
    }
}

// ── Nodes ──────────────────────────────────────────────────────

/// Node as exposed over the API. Never carries the daemon token.
#[derive(Debug, Serialize, Deserialize)]
pub struct NodeSummary {
    pub id: NodeId,
    pub name: String,
    pub description: Option<String>,
    pub fqdn: String,
    pub scheme: Scheme,
    pub daemon_listen: u16,
    pub public: bool,
    pub maintenance_mode: bool,
    pub memory_mb: u64,
    pub memory_overallocate: i32,
    pub disk_mb: u64,
    pub disk_overallocate: i32,
    pub allocated_memory_mb: u64,
    pub allocated_disk_mb: u64,
}

impl From<&NodeRecord> for NodeSummary {
    fn from(node: &NodeRecord) -> Self {
        Self {
            id: node.id,
            name: node.name.clone(),
            description: node.description.clone(),
            fqdn: node.fqdn.clone(),
            scheme: node.scheme,
            daemon_listen: node.daemon_listen,
            public: node.public,
            maintenance_mode: node.maintenance_mode,
            memory_mb: node.memory_mb,
            memory_overallocate: node.memory_overallocate,
            disk_mb: node.disk_mb,
            disk_overallocate: node.disk_overallocate,
            allocated_memory_mb: node.sum_memory_mb,
            allocated_disk_mb: node.sum_disk_mb,
        }
    }
}

/// GET /api/v1/nodes
pub async fn list_nodes<F: TelemetrySource>(State(state): State<ApiState<F>>) -> impl IntoResponse {
    match state.store.list_nodes() {
        Ok(nodes) => {
            let summaries: Vec<NodeSummary> = nodes.iter().map(NodeSummary::from).collect();
            ApiResponse::ok(summaries).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Capacity ───────────────────────────────────────────────────

/// `?memory=&disk=` in MB. Missing values count as zero.
#[derive(Debug, Default, Deserialize)]
pub struct CapacityQuery {
    #[serde(default)]
    pub memory: i64,
    #[serde(default)]
    pub disk: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ViabilityResponse {
    pub node_id: NodeId,
    pub viable: bool,
    pub headroom_memory_mb: i64,
    pub headroom_disk_mb: i64,
}

/// GET /api/v1/nodes/{id}/viability
pub async fn node_viability<F: TelemetrySource>(
    State(state): State<ApiState<F>>,
    Path(id): Path<NodeId>,
    Query(query): Query<CapacityQuery>,
) -> impl IntoResponse {
    let node = match state.store.get_node(id) {
        Ok(Some(node)) => node,
        Ok(None) => return error_response("node not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
    };

    let result = is_viable(&node, query.memory, query.disk)
        .and_then(|viable| headroom(&node).map(|h| (viable, h)));
    match result {
        Ok((viable, Headroom { memory_mb, disk_mb })) => ApiResponse::ok(ViabilityResponse {
            node_id: id,
            viable,
            headroom_memory_mb: memory_mb,
            headroom_disk_mb: disk_mb,
        })
        .into_response(),
        Err(e) => {
            warn!(node_id = id, error = %e, "viability check rejected");
            viability_error_response(&e)
        }
    }
}

/// GET /api/v1/placement/candidates
pub async fn placement_candidates<F: TelemetrySource>(
    State(state): State<ApiState<F>>,
    Query(query): Query<CapacityQuery>,
) -> impl IntoResponse {
    let nodes = match state.store.list_nodes() {
        Ok(nodes) => nodes,
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
    };
    match viable_nodes(&nodes, query.memory, query.disk) {
        Ok(candidates) => ApiResponse::ok(candidates).into_response(),
        Err(e) => viability_error_response(&e),
    }
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics<F: TelemetrySource>(
    State(state): State<ApiState<F>>,
) -> impl IntoResponse {
    let body = render_prometheus(&state.poller.snapshots().latest());
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::time::Duration;

    use fleetpanel_state::{DaemonToken, StateStore, WorkloadAllocation};
    use fleetpanel_telemetry::{
        FetchFailure, FleetPoller, SnapshotStore, TelemetryError, WorkloadUtilization,
    };

    /// Agent stand-in: node 2 is unreachable, everyone else reports one workload.
    struct StubSource;

    impl TelemetrySource for StubSource {
        fn fetch(
            &self,
            node: &NodeRecord,
        ) -> impl Future<Output = Result<Vec<WorkloadUtilization>, FetchFailure>> + Send {
            let node_id = node.id;
            async move {
                if node_id == 2 {
                    return Err(FetchFailure::new(
                        node_id,
                        TelemetryError::Transport("connection refused".into()),
                    ));
                }
                Ok(vec![WorkloadUtilization {
                    workload_id: "w".to_string(),
                    memory_bytes: 1024 * 1024 * 1024,
                    disk_bytes: 0,
                    cpu_percent: 10.0,
                    disk_budget_mb: 2048,
                }])
            }
        }
    }

    fn test_node(id: NodeId) -> NodeRecord {
        NodeRecord {
            id,
            name: format!("node-{id}"),
            description: None,
            fqdn: format!("node{id}.example.com"),
            scheme: Scheme::Https,
            daemon_listen: 8080,
            behind_proxy: false,
            memory_mb: 4096,
            memory_overallocate: 10,
            disk_mb: 10_240,
            disk_overallocate: 0,
            public: true,
            maintenance_mode: false,
            daemon_token_id: "tokenid".to_string(),
            daemon_token: DaemonToken::new("super-secret"),
            sum_memory_mb: 0,
            sum_disk_mb: 0,
        }
    }

    fn test_state() -> ApiState<StubSource> {
        let store = StateStore::open_in_memory().unwrap();
        let poller = FleetPoller::new(
            store.clone(),
            StubSource,
            SnapshotStore::new(),
            Duration::from_secs(30),
        );
        ApiState { store, poller }
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn node_metrics_empty_before_first_cycle() {
        let state = test_state();
        let resp = node_metrics(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn refresh_then_metrics_reflect_cycle() {
        let state = test_state();
        state.store.put_node(&test_node(1)).unwrap();
        state.store.put_node(&test_node(2)).unwrap();

        let resp = refresh_metrics(State(state.clone())).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["cycle"], 1);
        assert_eq!(body["data"]["failed"], 1);

        let resp = node_metrics(State(state)).await.into_response();
        let rows = body_json(resp).await;
        assert_eq!(rows[0]["status"], "online");
        assert_eq!(rows[0]["memory"]["used"], 1.0);
        assert_eq!(rows[0]["memory"]["total"], 4.0);
        assert_eq!(rows[1]["status"], "offline");
        assert_eq!(rows[1]["cpu"]["usage"], 0.0);
    }

    #[tokio::test]
    async fn list_nodes_hides_token_and_shows_allocation() {
        let state = test_state();
        state.store.put_node(&test_node(1)).unwrap();
        state
            .store
            .put_allocation(&WorkloadAllocation {
                workload_id: "srv".to_string(),
                node_id: 1,
                memory_mb: 1000,
                disk_mb: 500,
            })
            .unwrap();

        let resp = list_nodes(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"][0]["allocated_memory_mb"], 1000);
        assert!(!body.to_string().contains("super-secret"));
    }

    #[tokio::test]
    async fn viability_for_unknown_node_is_404() {
        let state = test_state();
        let resp = node_viability(State(state), Path(9), Query(CapacityQuery::default()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn viability_checks_overallocated_ceiling() {
        let state = test_state();
        state.store.put_node(&test_node(1)).unwrap();
        state
            .store
            .put_allocation(&WorkloadAllocation {
                workload_id: "srv".to_string(),
                node_id: 1,
                memory_mb: 4000,
                disk_mb: 0,
            })
            .unwrap();

        let query = CapacityQuery {
            memory: 400,
            disk: 0,
        };
        let resp = node_viability(State(state), Path(1), Query(query))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["viable"], true);
        assert_eq!(body["data"]["headroom_memory_mb"], 505);
    }

    #[tokio::test]
    async fn negative_request_is_400() {
        let state = test_state();
        state.store.put_node(&test_node(1)).unwrap();
        let query = CapacityQuery {
            memory: -1,
            disk: 0,
        };
        let resp = node_viability(State(state), Path(1), Query(query))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn candidates_skip_maintenance_nodes() {
        let state = test_state();
        state.store.put_node(&test_node(1)).unwrap();
        let mut maintenance = test_node(2);
        maintenance.maintenance_mode = true;
        state.store.put_node(&maintenance).unwrap();

        let query = CapacityQuery {
            memory: 1024,
            disk: 1024,
        };
        let resp = placement_candidates(State(state), Query(query))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["node_id"], 1);
    }

    #[tokio::test]
    async fn prometheus_content_type() {
        let state = test_state();
        let resp = prometheus_metrics(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.contains("text/plain"));
    }
}
