//! Capacity ceilings and the viability check.
//!
//! A node's ceiling for a resource is its limit scaled by the
//! overallocation percentage: `limit * (1 + overallocate / 100)`. A node is
//! viable for a request when committed + requested stays at or under the
//! ceiling for both memory and disk.

use std::fmt;

use fleetpanel_state::{NodeId, NodeRecord};
use serde::Serialize;
use thiserror::Error;

/// Overallocation value stored by older panels to mean "disabled".
const OVERALLOCATE_DISABLED: i32 = -1;

/// Lowest accepted overallocation percentage (zero effective capacity).
const OVERALLOCATE_FLOOR: i32 = -100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Memory,
    Disk,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Memory => f.write_str("memory"),
            Resource::Disk => f.write_str("disk"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ViabilityError {
    #[error("negative {resource} request: {requested} MB")]
    NegativeRequest { resource: Resource, requested: i64 },

    #[error("node {node_id} has invalid capacity: {reason}")]
    InvalidNode { node_id: NodeId, reason: String },
}

/// Remaining MB under each ceiling. Negative when the node is already
/// committed past its ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Headroom {
    pub memory_mb: i64,
    pub disk_mb: i64,
}

/// Effective ceiling in MB for a limit and an overallocation percentage.
pub fn ceiling_mb(limit_mb: u64, overallocate: i32) -> f64 {
    let percent = if overallocate == OVERALLOCATE_DISABLED {
        0
    } else {
        overallocate
    };
    limit_mb as f64 * (1.0 + f64::from(percent) / 100.0)
}

/// Whether `node` can accept a workload needing the given memory and disk.
pub fn is_viable(
    node: &NodeRecord,
    requested_memory_mb: i64,
    requested_disk_mb: i64,
) -> Result<bool, ViabilityError> {
    let memory = check_request(Resource::Memory, requested_memory_mb)?;
    let disk = check_request(Resource::Disk, requested_disk_mb)?;
    check_node(node)?;

    let memory_ceiling = ceiling_mb(node.memory_mb, node.memory_overallocate);
    let disk_ceiling = ceiling_mb(node.disk_mb, node.disk_overallocate);

    let memory_fits = node.sum_memory_mb.saturating_add(memory) as f64 <= memory_ceiling;
    let disk_fits = node.sum_disk_mb.saturating_add(disk) as f64 <= disk_ceiling;
    Ok(memory_fits && disk_fits)
}

/// Remaining capacity of `node` before any new request.
pub fn headroom(node: &NodeRecord) -> Result<Headroom, ViabilityError> {
    check_node(node)?;
    let remaining = |ceiling: f64, committed: u64| ceiling.floor() as i64 - committed as i64;
    Ok(Headroom {
        memory_mb: remaining(
            ceiling_mb(node.memory_mb, node.memory_overallocate),
            node.sum_memory_mb,
        ),
        disk_mb: remaining(
            ceiling_mb(node.disk_mb, node.disk_overallocate),
            node.sum_disk_mb,
        ),
    })
}

pub(crate) fn check_request(resource: Resource, requested: i64) -> Result<u64, ViabilityError> {
    u64::try_from(requested).map_err(|_| ViabilityError::NegativeRequest {
        resource,
        requested,
    })
}

fn check_node(node: &NodeRecord) -> Result<(), ViabilityError> {
    let invalid = |reason: String| ViabilityError::InvalidNode {
        node_id: node.id,
        reason,
    };
    if node.memory_mb == 0 {
        return Err(invalid("memory limit is zero".to_string()));
    }
    if node.disk_mb == 0 {
        return Err(invalid("disk limit is zero".to_string()));
    }
    if node.memory_overallocate < OVERALLOCATE_FLOOR {
        return Err(invalid(format!(
            "memory overallocation {}% is below {OVERALLOCATE_FLOOR}%",
            node.memory_overallocate
        )));
    }
    if node.disk_overallocate < OVERALLOCATE_FLOOR {
        return Err(invalid(format!(
            "disk overallocation {}% is below {OVERALLOCATE_FLOOR}%",
            node.disk_overallocate
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetpanel_state::{DaemonToken, Scheme};

    fn make_node(memory_mb: u64, memory_over: i32, disk_mb: u64, disk_over: i32) -> NodeRecord {
        NodeRecord {
            id: 1,
            name: "node-1".to_string(),
            description: None,
            fqdn: "node1.example.com".to_string(),
            scheme: Scheme::Https,
            daemon_listen: 8080,
            behind_proxy: false,
            memory_mb,
            memory_overallocate: memory_over,
            disk_mb,
            disk_overallocate: disk_over,
            public: true,
            maintenance_mode: false,
            daemon_token_id: String::new(),
            daemon_token: DaemonToken::default(),
            sum_memory_mb: 0,
            sum_disk_mb: 0,
        }
    }

    #[test]
    fn zero_overallocate_is_exact_limit() {
        let mut node = make_node(4096, 0, 10_000, 0);
        node.sum_memory_mb = 4000;
        assert!(is_viable(&node, 96, 0).unwrap());
        assert!(!is_viable(&node, 97, 0).unwrap());
    }

    #[test]
    fn positive_overallocate_raises_ceiling() {
        // 4096 * 1.1 = 4505.6
        let mut node = make_node(4096, 10, 10_000, 0);
        node.sum_memory_mb = 4000;
        assert!(is_viable(&node, 400, 0).unwrap());
        assert!(is_viable(&node, 505, 0).unwrap());
        assert!(!is_viable(&node, 506, 0).unwrap());
    }

    #[test]
    fn minus_one_is_treated_as_disabled() {
        let mut node = make_node(2048, -1, 2048, -1);
        node.sum_memory_mb = 2000;
        assert_eq!(ceiling_mb(2048, -1), 2048.0);
        assert!(is_viable(&node, 48, 0).unwrap());
        assert!(!is_viable(&node, 49, 0).unwrap());
    }

    #[test]
    fn minus_hundred_accepts_nothing_positive() {
        let node = make_node(8192, -100, 8192, 0);
        assert_eq!(ceiling_mb(8192, -100), 0.0);
        assert!(!is_viable(&node, 1, 0).unwrap());
        assert!(is_viable(&node, 0, 0).unwrap());
    }

    #[test]
    fn negative_overallocate_shrinks_ceiling() {
        let node = make_node(1000, -50, 1000, 0);
        assert!(is_viable(&node, 500, 0).unwrap());
        assert!(!is_viable(&node, 501, 0).unwrap());
    }

    #[test]
    fn disk_must_fit_too() {
        let mut node = make_node(4096, 0, 1000, 0);
        node.sum_disk_mb = 900;
        assert!(is_viable(&node, 10, 100).unwrap());
        assert!(!is_viable(&node, 10, 101).unwrap());
    }

    #[test]
    fn negative_request_is_an_error() {
        let node = make_node(4096, 0, 4096, 0);
        assert_eq!(
            is_viable(&node, -1, 0),
            Err(ViabilityError::NegativeRequest {
                resource: Resource::Memory,
                requested: -1
            })
        );
        assert!(matches!(
            is_viable(&node, 0, -5),
            Err(ViabilityError::NegativeRequest {
                resource: Resource::Disk,
                ..
            })
        ));
    }

    #[test]
    fn invalid_records_are_rejected_not_clamped() {
        let node = make_node(4096, -101, 4096, 0);
        assert!(matches!(
            is_viable(&node, 1, 1),
            Err(ViabilityError::InvalidNode { node_id: 1, .. })
        ));

        let node = make_node(0, 0, 4096, 0);
        assert!(matches!(
            is_viable(&node, 0, 0),
            Err(ViabilityError::InvalidNode { .. })
        ));
    }

    #[test]
    fn headroom_reports_remaining_mb() {
        let mut node = make_node(4096, 10, 1000, 0);
        node.sum_memory_mb = 4000;
        node.sum_disk_mb = 1200;
        let h = headroom(&node).unwrap();
        assert_eq!(h.memory_mb, 505);
        assert_eq!(h.disk_mb, -200);
    }
}
