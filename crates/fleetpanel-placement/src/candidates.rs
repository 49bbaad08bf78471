//! Candidate nodes for automatic placement.

use std::cmp::Reverse;

use fleetpanel_state::{NodeId, NodeRecord};
use serde::Serialize;
use tracing::{debug, warn};

use crate::viability::{self, Headroom, Resource, ViabilityError, check_request};

/// A node that can accept the requested workload.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub node_id: NodeId,
    pub name: String,
    pub headroom: Headroom,
}

/// Nodes eligible for auto-placement of a workload with the given needs.
///
/// A node qualifies when it is public, not under maintenance and viable.
/// Results are ordered by memory headroom (largest first), then by id.
pub fn viable_nodes(
    nodes: &[NodeRecord],
    memory_mb: i64,
    disk_mb: i64,
) -> Result<Vec<Candidate>, ViabilityError> {
    check_request(Resource::Memory, memory_mb)?;
    check_request(Resource::Disk, disk_mb)?;

    let mut candidates = Vec::new();
    for node in nodes {
        if !node.public || node.is_under_maintenance() {
            debug!(node_id = node.id, "node not eligible for auto-placement");
            continue;
        }

        let viable = match viability::is_viable(node, memory_mb, disk_mb) {
            Ok(viable) => viable,
            Err(e @ ViabilityError::InvalidNode { .. }) => {
                warn!(node_id = node.id, error = %e, "skipping node with invalid capacity");
                continue;
            }
            Err(e) => return Err(e),
        };
        if !viable {
            continue;
        }

        candidates.push(Candidate {
            node_id: node.id,
            name: node.name.clone(),
            headroom: viability::headroom(node)?,
        });
    }

    candidates.sort_by_key(|c| (Reverse(c.headroom.memory_mb), c.node_id));
    Ok(candidates)
}
