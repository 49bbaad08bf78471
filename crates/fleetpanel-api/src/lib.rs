//! fleetpanel-api — REST API for the fleet panel.
//!
//! Provides axum route handlers for the admin dashboard's node metrics,
//! on-demand poll cycles, capacity checks and placement candidates.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/admin/nodes/metrics` | Latest dashboard projection of every node |
//! | POST | `/admin/nodes/metrics/refresh` | Run a poll cycle now |
//! | GET | `/api/v1/nodes` | List nodes with committed allocation |
//! | GET | `/api/v1/nodes/{id}/viability` | Can the node take `?memory=&disk=` more MB |
//! | GET | `/api/v1/placement/candidates` | Nodes eligible for `?memory=&disk=` |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;

use axum::Router;
use axum::routing::{get, post};
use fleetpanel_state::StateStore;
use fleetpanel_telemetry::{FleetPoller, TelemetrySource};

/// Shared state for API handlers.
pub struct ApiState<F> {
    pub store: StateStore,
    pub poller: FleetPoller<F>,
}

impl<F> Clone for ApiState<F> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            poller: self.poller.clone(),
        }
    }
}

/// Build the complete API router (admin + REST + metrics).
pub fn build_router<F: TelemetrySource>(store: StateStore, poller: FleetPoller<F>) -> Router {
    let state = ApiState { store, poller };

    let admin_routes = Router::new()
        .route("/nodes/metrics", get(handlers::node_metrics::<F>))
        .route("/nodes/metrics/refresh", post(handlers::refresh_metrics::<F>))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/nodes", get(handlers::list_nodes::<F>))
        .route("/nodes/{id}/viability", get(handlers::node_viability::<F>))
        .route("/placement/candidates", get(handlers::placement_candidates::<F>))
        .with_state(state.clone());

    Router::new()
        .nest("/admin", admin_routes)
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics::<F>).with_state(state))
}
