//! fleetpanel-state — node inventory for the fleet panel.
//!
//! Backed by [redb](https://docs.rs/redb), holds the persisted description
//! of every node (capacity limits, connection coordinates, credentials,
//! maintenance flag) and the workload allocations already committed to
//! each node.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Nodes are keyed by their numeric id; allocations by
//! `{node_id}:{workload_id}` so a prefix scan yields a node's commitments.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks. Reads through
//! [`StateStore::list_nodes`] return records with `sum_memory_mb` /
//! `sum_disk_mb` already filled from the allocation table.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
