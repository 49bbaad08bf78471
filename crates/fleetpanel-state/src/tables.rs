//! redb table definitions for the node inventory.
//!
//! Values are JSON-serialized domain types.

use redb::TableDefinition;

/// Node records keyed by numeric node id.
pub const NODES: TableDefinition<u32, &[u8]> = TableDefinition::new("nodes");

/// Committed workload allocations keyed by `{node_id}:{workload_id}`.
pub const ALLOCATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("allocations");
