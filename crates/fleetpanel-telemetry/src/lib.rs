//! fleetpanel telemetry — live CPU, memory and disk usage per node.
//!
//! Polls every node's management agent on a fixed cadence, aggregates the
//! per-workload utilization it reports into node-level summaries and
//! publishes the whole fleet as one immutable snapshot.
//!
//! # Components
//!
//! - **`client`** — Authenticated HTTP fetch of a node's workload list
//! - **`credentials`** — Bearer token lookup for a node
//! - **`aggregate`** — Per-workload utilization → node snapshot
//! - **`poller`** — Fan-out/collect/publish cycles on a timer or on demand
//! - **`snapshot`** — Latest published fleet snapshot, readable without blocking
//! - **`view`** — Dashboard projection (GiB, percentages, status)
//! - **`prometheus`** — Text exposition of the latest snapshot
//!
//! A failed node never fails the cycle: it is published as offline with
//! the cause attached, next to its healthy siblings.

pub mod aggregate;
pub mod client;
pub mod credentials;
pub mod error;
pub mod poller;
pub mod prometheus;
pub mod snapshot;
pub mod types;
pub mod view;

pub use aggregate::{aggregate, offline_snapshot};
pub use client::{ClientOptions, TelemetryClient, TelemetrySource};
pub use credentials::{CredentialProvider, RecordCredentials};
pub use error::{FetchFailure, TelemetryError};
pub use poller::{CycleOutcome, CycleReport, FleetPoller, NodePhase};
pub use prometheus::render_prometheus;
pub use snapshot::SnapshotStore;
pub use types::{CpuUsage, FleetSnapshot, NodeTelemetrySnapshot, ResourceUsage, WorkloadUtilization};
pub use view::{NodeMetricsView, NodeStatus, project};
