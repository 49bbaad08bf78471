//! Domain types for the node inventory.
//!
//! These types represent the persisted description of nodes and the
//! workload allocations committed to them. All types are serializable
//! to/from JSON for storage in redb tables.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Unique numeric identifier for a node.
pub type NodeId = u32;

/// Unique identifier for a workload (a game-server instance).
pub type WorkloadId = String;

/// Mebibyte in bytes.
pub const MIB: u64 = 1024 * 1024;

static NODE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w .-]{1,100}$").expect("node name pattern is valid"));

// ── Node ──────────────────────────────────────────────────────────

/// Persisted description of a node running a management agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeRecord {
    pub id: NodeId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub fqdn: String,
    #[serde(default)]
    pub scheme: Scheme,
    /// Port the node agent listens on.
    #[serde(default = "default_daemon_listen")]
    pub daemon_listen: u16,
    #[serde(default)]
    pub behind_proxy: bool,
    /// Memory limit in MB.
    pub memory_mb: u64,
    /// Extra memory that may be committed, as a percentage of the limit.
    #[serde(default)]
    pub memory_overallocate: i32,
    /// Disk limit in MB.
    pub disk_mb: u64,
    /// Extra disk that may be committed, as a percentage of the limit.
    #[serde(default)]
    pub disk_overallocate: i32,
    /// Eligible for automatic placement.
    #[serde(default = "default_true")]
    pub public: bool,
    /// Excluded from new placements but still polled.
    #[serde(default)]
    pub maintenance_mode: bool,
    #[serde(default)]
    pub daemon_token_id: String,
    #[serde(default)]
    pub daemon_token: DaemonToken,
    /// Committed memory across placed workloads (MB). Filled by the store.
    #[serde(skip)]
    pub sum_memory_mb: u64,
    /// Committed disk across placed workloads (MB). Filled by the store.
    #[serde(skip)]
    pub sum_disk_mb: u64,
}

fn default_daemon_listen() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

impl NodeRecord {
    /// Address used when calling the node agent, e.g. `https://node1.example.com:8080`.
    pub fn connection_address(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.fqdn, self.daemon_listen)
    }

    /// Check the record's invariants.
    pub fn validate(&self) -> Result<(), String> {
        if !NODE_NAME.is_match(&self.name) {
            return Err(format!("invalid name {:?}", self.name));
        }
        if self.fqdn.trim().is_empty() {
            return Err("fqdn is empty".to_string());
        }
        if self.daemon_listen == 0 {
            return Err("daemon_listen must be between 1 and 65535".to_string());
        }
        if self.memory_mb == 0 {
            return Err("memory limit must be positive".to_string());
        }
        if self.disk_mb == 0 {
            return Err("disk limit must be positive".to_string());
        }
        if self.memory_overallocate < -100 {
            return Err(format!(
                "memory_overallocate {} is below -100",
                self.memory_overallocate
            ));
        }
        if self.disk_overallocate < -100 {
            return Err(format!(
                "disk_overallocate {} is below -100",
                self.disk_overallocate
            ));
        }
        Ok(())
    }

    /// Whether the node is under maintenance.
    pub fn is_under_maintenance(&self) -> bool {
        self.maintenance_mode
    }
}

/// Connection scheme used to reach the node agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    #[default]
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => f.write_str("http"),
            Scheme::Https => f.write_str("https"),
        }
    }
}

/// Bearer token used to authenticate to a node agent.
///
/// `Debug` never prints the value.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DaemonToken(String);

impl DaemonToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Raw token value, for the telemetry client's `Authorization` header.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DaemonToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("DaemonToken(<empty>)")
        } else {
            f.write_str("DaemonToken(<redacted>)")
        }
    }
}

// ── Allocation ────────────────────────────────────────────────────

/// Resources committed to a workload placed on a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkloadAllocation {
    pub workload_id: WorkloadId,
    pub node_id: NodeId,
    pub memory_mb: u64,
    pub disk_mb: u64,
}

impl WorkloadAllocation {
    /// Build the composite key for the allocations table.
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.node_id, self.workload_id)
    }
}
