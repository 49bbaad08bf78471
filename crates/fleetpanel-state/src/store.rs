//! StateStore — redb-backed node inventory.
//!
//! Provides typed CRUD operations over node records and committed
//! workload allocations. All values are JSON-serialized into redb's
//! `&[u8]` value columns. The store supports both on-disk and in-memory
//! backends (the latter for testing).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadTransaction, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe node inventory backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(NODES).map_err(map_err!(Table))?;
        txn.open_table(ALLOCATIONS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Nodes ──────────────────────────────────────────────────────

    /// Insert or update a node record. The record is validated first.
    pub fn put_node(&self, node: &NodeRecord) -> StateResult<()> {
        node.validate().map_err(|reason| StateError::InvalidNode {
            node_id: node.id,
            reason,
        })?;
        let value = serde_json::to_vec(node).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            table
                .insert(node.id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(node_id = node.id, name = %node.name, "node stored");
        Ok(())
    }

    /// Get a node by id, with its committed allocation filled in.
    pub fn get_node(&self, node_id: NodeId) -> StateResult<Option<NodeRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        let Some(guard) = table.get(node_id).map_err(map_err!(Read))? else {
            return Ok(None);
        };
        let mut node: NodeRecord =
            serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
        let totals = allocation_totals(&txn)?;
        apply_totals(&mut node, &totals);
        Ok(Some(node))
    }

    /// List all nodes ordered by id, with committed allocations filled in.
    pub fn list_nodes(&self) -> StateResult<Vec<NodeRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let totals = allocation_totals(&txn)?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let mut node: NodeRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            apply_totals(&mut node, &totals);
            results.push(node);
        }
        Ok(results)
    }

    /// Delete a node and its allocations. Returns true if the node existed.
    pub fn delete_node(&self, node_id: NodeId) -> StateResult<bool> {
        let prefix = format!("{node_id}:");
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        let removed;
        {
            let mut nodes = txn.open_table(NODES).map_err(map_err!(Table))?;
            existed = nodes.remove(node_id).map_err(map_err!(Write))?.is_some();
            // Scanned under the write lock; a concurrent put_allocation
            // either lands before this or sees the node gone.
            let mut allocations = txn.open_table(ALLOCATIONS).map_err(map_err!(Table))?;
            let keys = keys_with_prefix(&allocations, &prefix)?;
            for key in &keys {
                allocations.remove(key.as_str()).map_err(map_err!(Write))?;
            }
            removed = keys.len();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(node_id, existed, allocations = removed, "node deleted");
        Ok(existed)
    }

    // ── Allocations ────────────────────────────────────────────────

    /// Record resources committed to a workload. The node must exist.
    pub fn put_allocation(&self, allocation: &WorkloadAllocation) -> StateResult<()> {
        let key = allocation.table_key();
        let value = serde_json::to_vec(allocation).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let nodes = txn.open_table(NODES).map_err(map_err!(Table))?;
            if nodes
                .get(allocation.node_id)
                .map_err(map_err!(Read))?
                .is_none()
            {
                return Err(StateError::UnknownNode(allocation.node_id));
            }
            let mut table = txn.open_table(ALLOCATIONS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "allocation stored");
        Ok(())
    }

    /// List the allocations committed to a node.
    pub fn list_allocations_for_node(
        &self,
        node_id: NodeId,
    ) -> StateResult<Vec<WorkloadAllocation>> {
        let prefix = format!("{node_id}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ALLOCATIONS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let allocation: WorkloadAllocation =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(allocation);
            }
        }
        Ok(results)
    }

    /// Delete one allocation. Returns true if it existed.
    pub fn delete_allocation(&self, node_id: NodeId, workload_id: &str) -> StateResult<bool> {
        let key = format!("{node_id}:{workload_id}");
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(ALLOCATIONS).map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }
}

fn keys_with_prefix(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    prefix: &str,
) -> StateResult<Vec<String>> {
    let mut keys = Vec::new();
    for entry in table.iter().map_err(map_err!(Read))? {
        let (key, _) = entry.map_err(map_err!(Read))?;
        if key.value().starts_with(prefix) {
            keys.push(key.value().to_string());
        }
    }
    Ok(keys)
}

/// Sum committed (memory, disk) per node inside one read transaction.
fn allocation_totals(txn: &ReadTransaction) -> StateResult<HashMap<NodeId, (u64, u64)>> {
    let table = txn.open_table(ALLOCATIONS).map_err(map_err!(Table))?;
    let mut totals: HashMap<NodeId, (u64, u64)> = HashMap::new();
    for entry in table.iter().map_err(map_err!(Read))? {
        let (_, value) = entry.map_err(map_err!(Read))?;
        let allocation: WorkloadAllocation =
            serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
        let slot = totals.entry(allocation.node_id).or_default();
        slot.0 = slot.0.saturating_add(allocation.memory_mb);
        slot.1 = slot.1.saturating_add(allocation.disk_mb);
    }
    Ok(totals)
}

fn apply_totals(node: &mut NodeRecord, totals: &HashMap<NodeId, (u64, u64)>) {
    let (memory, disk) = totals.get(&node.id).copied().unwrap_or_default();
    node.sum_memory_mb = memory;
    node.sum_disk_mb = disk;
}
