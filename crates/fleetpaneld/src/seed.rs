//! Inventory seeding from `panel.toml`.

use fleetpanel_core::PanelConfig;
use fleetpanel_state::{StateResult, StateStore};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub nodes: usize,
    pub allocations: usize,
}

/// Upsert the configured nodes, then their allocations.
pub fn seed_inventory(store: &StateStore, config: &PanelConfig) -> StateResult<SeedSummary> {
    for node in &config.nodes {
        store.put_node(node)?;
        info!(
            node_id = node.id,
            name = %node.name,
            address = %node.connection_address(),
            "node seeded"
        );
    }
    for allocation in &config.allocations {
        store.put_allocation(allocation)?;
    }

    Ok(SeedSummary {
        nodes: config.nodes.len(),
        allocations: config.allocations.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
[[nodes]]
id = 1
name = "node-a"
fqdn = "a.example.com"
memory_mb = 4096
disk_mb = 10240
daemon_token = "t"

[[allocations]]
workload_id = "srv-1"
node_id = 1
memory_mb = 1024
disk_mb = 2048

[[allocations]]
workload_id = "srv-2"
node_id = 1
memory_mb = 512
disk_mb = 0
"#;

    #[test]
    fn seeds_nodes_and_allocations() {
        let store = StateStore::open_in_memory().unwrap();
        let config = PanelConfig::parse(CONFIG).unwrap();

        let summary = seed_inventory(&store, &config).unwrap();
        assert_eq!(summary, SeedSummary { nodes: 1, allocations: 2 });

        let node = store.get_node(1).unwrap().unwrap();
        assert_eq!(node.sum_memory_mb, 1536);
        assert_eq!(node.sum_disk_mb, 2048);
    }

    #[test]
    fn seeding_twice_is_idempotent() {
        let store = StateStore::open_in_memory().unwrap();
        let config = PanelConfig::parse(CONFIG).unwrap();

        seed_inventory(&store, &config).unwrap();
        seed_inventory(&store, &config).unwrap();

        assert_eq!(store.list_nodes().unwrap().len(), 1);
        assert_eq!(store.get_node(1).unwrap().unwrap().sum_memory_mb, 1536);
    }
}
