//! Per-workload utilization → node-level summary.

use fleetpanel_state::{MIB, NodeRecord};

use crate::error::{FetchFailure, TelemetryError};
use crate::types::{CpuUsage, NodeTelemetrySnapshot, ResourceUsage, WorkloadUtilization};

/// Build the snapshot for `node` from the outcome of its fetch.
///
/// Memory total comes from the node's configured limit; disk total is the
/// sum of the workloads' disk budgets. A node counts as online only when
/// the fetch succeeded and the reported CPU (rounded to two decimals) is
/// above zero; an agent that answers but reports no CPU activity at all is
/// treated as not running.
pub fn aggregate(
    node: &NodeRecord,
    fetched: &Result<Vec<WorkloadUtilization>, FetchFailure>,
    fetched_at: u64,
) -> NodeTelemetrySnapshot {
    let workloads = match fetched {
        Ok(workloads) => workloads,
        Err(failure) => return offline_snapshot(node, failure.cause.clone(), fetched_at),
    };

    let used_memory = workloads
        .iter()
        .map(|w| w.memory_bytes)
        .fold(0u64, u64::saturating_add);
    let used_disk = workloads
        .iter()
        .map(|w| w.disk_bytes)
        .fold(0u64, u64::saturating_add);
    let total_disk = workloads
        .iter()
        .map(|w| w.disk_budget_mb.saturating_mul(MIB))
        .fold(0u64, u64::saturating_add);
    let total_memory = node.memory_mb.saturating_mul(MIB);
    let cpu = round2(sum_cpu(workloads));

    NodeTelemetrySnapshot {
        node_id: node.id,
        name: node.name.clone(),
        maintenance_mode: node.maintenance_mode,
        online: cpu > 0.0,
        memory: usage(used_memory, total_memory),
        cpu: CpuUsage { usage_percent: cpu },
        disk: usage(used_disk, total_disk),
        fetched_at,
        workload_count: workloads.len(),
        error: None,
    }
}

/// Snapshot for a node whose telemetry could not be collected.
pub fn offline_snapshot(
    node: &NodeRecord,
    cause: TelemetryError,
    fetched_at: u64,
) -> NodeTelemetrySnapshot {
    NodeTelemetrySnapshot {
        node_id: node.id,
        name: node.name.clone(),
        maintenance_mode: node.maintenance_mode,
        online: false,
        memory: ResourceUsage::default(),
        cpu: CpuUsage::default(),
        disk: ResourceUsage::default(),
        fetched_at,
        workload_count: 0,
        error: Some(cause),
    }
}

// Float addition is not associative; sort first so every permutation of
// the same workloads sums to the same bits.
fn sum_cpu(workloads: &[WorkloadUtilization]) -> f64 {
    let mut values: Vec<f64> = workloads.iter().map(|w| w.cpu_percent).collect();
    values.sort_by(f64::total_cmp);
    values.into_iter().sum()
}

fn usage(used: u64, total: u64) -> ResourceUsage {
    ResourceUsage {
        used_bytes: used,
        total_bytes: total,
        used_percent: percent(used, total),
    }
}

pub(crate) fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(used as f64 / total as f64 * 100.0)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
