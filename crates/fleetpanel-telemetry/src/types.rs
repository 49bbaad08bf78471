//! Telemetry data produced each poll cycle.

use std::collections::BTreeMap;

use fleetpanel_state::NodeId;
use serde::Serialize;

use crate::error::TelemetryError;

/// Live usage of one workload as reported by its node agent.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct WorkloadUtilization {
    pub workload_id: String,
    pub memory_bytes: u64,
    pub disk_bytes: u64,
    /// Absolute CPU percentage; may exceed 100 on multi-core hosts.
    pub cpu_percent: f64,
    /// Disk budget configured for the workload, in MB.
    pub disk_budget_mb: u64,
}

/// Used/total pair for memory or disk.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ResourceUsage {
    pub used_bytes: u64,
    pub total_bytes: u64,
    /// `used / total * 100`, two decimals; 0 when total is 0.
    pub used_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CpuUsage {
    pub usage_percent: f64,
}

/// One node's aggregated telemetry for one poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeTelemetrySnapshot {
    pub node_id: NodeId,
    pub name: String,
    /// Maintenance flag as it was when the node was polled.
    pub maintenance_mode: bool,
    pub online: bool,
    pub memory: ResourceUsage,
    pub cpu: CpuUsage,
    pub disk: ResourceUsage,
    /// Unix milliseconds when the fetch completed.
    pub fetched_at: u64,
    pub workload_count: usize,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<TelemetryError>,
}

fn serialize_error<S: serde::Serializer>(
    error: &Option<TelemetryError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Every node's snapshot from one completed cycle.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FleetSnapshot {
    /// Monotonic cycle number; 0 before the first cycle completes.
    pub cycle: u64,
    /// Unix milliseconds when the cycle was published.
    pub published_at: u64,
    pub nodes: BTreeMap<NodeId, NodeTelemetrySnapshot>,
}

impl FleetSnapshot {
    pub fn get(&self, node_id: NodeId) -> Option<&NodeTelemetrySnapshot> {
        self.nodes.get(&node_id)
    }

    /// Snapshots in node id order.
    pub fn iter(&self) -> impl Iterator<Item = &NodeTelemetrySnapshot> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn online_count(&self) -> usize {
        self.iter().filter(|n| n.online).count()
    }
}
