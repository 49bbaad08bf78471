//! fleetpanel capacity accounting.
//!
//! Decides whether a node can take one more workload given its limits,
//! its overallocation percentages and the resources already committed to
//! it. Decisions are pure functions of the [`NodeRecord`] and never look
//! at live telemetry.
//!
//! # Components
//!
//! - **`viability`** — Ceiling computation, `is_viable`, headroom
//! - **`candidates`** — Nodes eligible for automatic placement, ranked
//!
//! [`NodeRecord`]: fleetpanel_state::NodeRecord

pub mod candidates;
pub mod viability;

pub use candidates::{Candidate, viable_nodes};
pub use viability::{Headroom, Resource, ViabilityError, ceiling_mb, headroom, is_viable};
