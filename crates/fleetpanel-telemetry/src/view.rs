//! Dashboard projection of node snapshots.
//!
//! The admin dashboard refreshes every few seconds from
//! `/admin/nodes/metrics`; each entry is a [`NodeMetricsView`]. Sizes are
//! shown in GiB with two decimals.

use fleetpanel_state::NodeId;
use serde::{Deserialize, Serialize};

use crate::aggregate::round2;
use crate::types::{FleetSnapshot, NodeTelemetrySnapshot};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const UNIT: &str = "GiB";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Online,
    Maintenance,
    /// No data available for this cycle.
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuView {
    pub usage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryView {
    pub used: f64,
    pub total: f64,
    pub used_memory_percentage: f64,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskView {
    pub used: f64,
    pub total: f64,
    pub used_percentage: f64,
    pub unit: String,
}

/// One row of the dashboard's node metrics table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMetricsView {
    pub id: NodeId,
    pub name: String,
    pub is_online: bool,
    pub maintenance_mode: bool,
    pub status: NodeStatus,
    pub cpu: CpuView,
    pub memory: MemoryView,
    pub disk: DiskView,
    pub fetched_at: u64,
    pub error: Option<String>,
}

impl NodeMetricsView {
    pub fn from_snapshot(snapshot: &NodeTelemetrySnapshot) -> Self {
        let status = if !snapshot.online {
            NodeStatus::Offline
        } else if snapshot.maintenance_mode {
            NodeStatus::Maintenance
        } else {
            NodeStatus::Online
        };

        // An offline row never carries numbers, even if the fetch itself
        // succeeded and only the CPU heuristic marked it offline.
        let (cpu, memory, disk) = if snapshot.online {
            (
                snapshot.cpu.usage_percent,
                (
                    gib(snapshot.memory.used_bytes),
                    gib(snapshot.memory.total_bytes),
                    snapshot.memory.used_percent,
                ),
                (
                    gib(snapshot.disk.used_bytes),
                    gib(snapshot.disk.total_bytes),
                    snapshot.disk.used_percent,
                ),
            )
        } else {
            (0.0, (0.0, 0.0, 0.0), (0.0, 0.0, 0.0))
        };

        Self {
            id: snapshot.node_id,
            name: snapshot.name.clone(),
            is_online: snapshot.online,
            maintenance_mode: snapshot.maintenance_mode,
            status,
            cpu: CpuView { usage: cpu },
            memory: MemoryView {
                used: memory.0,
                total: memory.1,
                used_memory_percentage: memory.2,
                unit: UNIT.to_string(),
            },
            disk: DiskView {
                used: disk.0,
                total: disk.1,
                used_percentage: disk.2,
                unit: UNIT.to_string(),
            },
            fetched_at: snapshot.fetched_at,
            error: snapshot.error.as_ref().map(ToString::to_string),
        }
    }
}

/// Project every node of a fleet snapshot, in node id order.
pub fn project(snapshot: &FleetSnapshot) -> Vec<NodeMetricsView> {
    snapshot.iter().map(NodeMetricsView::from_snapshot).collect()
}

fn gib(bytes: u64) -> f64 {
    round2(bytes as f64 / GIB)
}
