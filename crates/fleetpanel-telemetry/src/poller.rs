//! Fleet poll cycles.
//!
//! A cycle fans out one task per node, lets each fetch and aggregate on its
//! own, waits for all of them and publishes the results as one
//! [`FleetSnapshot`]. Each node moves through
//! `Pending → Fetching → Succeeded | Failed → Published`; a node failing
//! (or its task panicking) only marks that node offline.
//!
//! Only one cycle runs at a time. A trigger that arrives while a cycle is
//! in flight is skipped rather than queued.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fleetpanel_core::epoch_millis;
use fleetpanel_state::{NodeId, NodeRecord, StateError, StateStore};
use tokio::sync::{Mutex, Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::aggregate::{aggregate, offline_snapshot};
use crate::client::TelemetrySource;
use crate::error::TelemetryError;
use crate::snapshot::SnapshotStore;
use crate::types::{FleetSnapshot, NodeTelemetrySnapshot};

/// Where a node is within the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePhase {
    Pending,
    Fetching,
    Succeeded,
    Failed,
    Published,
}

/// Result of one completed cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub snapshot: Arc<FleetSnapshot>,
    /// Terminal fetch state per node (`Succeeded` or `Failed`).
    pub outcomes: BTreeMap<NodeId, NodePhase>,
    pub elapsed: Duration,
}

impl CycleReport {
    pub fn succeeded(&self) -> usize {
        self.count(NodePhase::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(NodePhase::Failed)
    }

    fn count(&self, phase: NodePhase) -> usize {
        self.outcomes.values().filter(|p| **p == phase).count()
    }
}

#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Another cycle was already in flight.
    Skipped,
}

/// Polls every node in the inventory and publishes fleet snapshots.
pub struct FleetPoller<F> {
    store: StateStore,
    source: Arc<F>,
    snapshots: SnapshotStore,
    interval: Duration,
    max_concurrency: Option<usize>,
    /// Held for the duration of a cycle; guards the cycle counter.
    cycle: Arc<Mutex<u64>>,
}

impl<F> Clone for FleetPoller<F> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            source: Arc::clone(&self.source),
            snapshots: self.snapshots.clone(),
            interval: self.interval,
            max_concurrency: self.max_concurrency,
            cycle: Arc::clone(&self.cycle),
        }
    }
}

impl<F: TelemetrySource> FleetPoller<F> {
    pub fn new(store: StateStore, source: F, snapshots: SnapshotStore, interval: Duration) -> Self {
        Self {
            store,
            source: Arc::new(source),
            snapshots,
            interval,
            max_concurrency: None,
            cycle: Arc::new(Mutex::new(0)),
        }
    }

    /// Cap the number of agent requests in flight at once.
    pub fn with_max_concurrency(mut self, limit: Option<usize>) -> Self {
        self.max_concurrency = limit;
        self
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Run one cycle over the current inventory unless one is in flight.
    pub async fn refresh(&self) -> Result<CycleOutcome, StateError> {
        let Ok(mut cycle) = self.cycle.try_lock() else {
            info!("poll cycle already in flight, skipping trigger");
            return Ok(CycleOutcome::Skipped);
        };
        let nodes = self.store.list_nodes()?;
        Ok(CycleOutcome::Completed(self.run_cycle(&mut cycle, nodes).await))
    }

    /// Poll `nodes` and publish the result, waiting for any in-flight cycle.
    pub async fn poll_all(&self, nodes: Vec<NodeRecord>) -> CycleReport {
        let mut cycle = self.cycle.lock().await;
        self.run_cycle(&mut cycle, nodes).await
    }

    /// Poll on every tick of the interval until `shutdown` changes.
    ///
    /// The first tick fires immediately so the dashboard has data on load.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_ms = self.interval.as_millis() as u64, "fleet poller started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.refresh().await {
                        Ok(CycleOutcome::Completed(_)) => {}
                        Ok(CycleOutcome::Skipped) => {
                            debug!("scheduled tick skipped, previous cycle still running");
                        }
                        Err(e) => {
                            error!(error = %e, "failed to load node inventory for poll cycle");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("fleet poller shutting down");
                    break;
                }
            }
        }
    }

    async fn run_cycle(&self, cycle: &mut u64, nodes: Vec<NodeRecord>) -> CycleReport {
        let started = Instant::now();
        *cycle += 1;
        let number = *cycle;
        let node_count = nodes.len();

        debug!(cycle = number, nodes = node_count, "poll cycle starting");

        let (results, outcomes) = self.collect(nodes).await;
        let snapshot = self.snapshots.publish(FleetSnapshot {
            cycle: number,
            published_at: epoch_millis(),
            nodes: results,
        });

        for node_id in outcomes.keys() {
            debug!(
                cycle = number,
                node_id,
                phase = ?NodePhase::Published,
                "node snapshot published"
            );
        }

        let report = CycleReport {
            snapshot,
            outcomes,
            elapsed: started.elapsed(),
        };
        info!(
            cycle = number,
            nodes = node_count,
            online = report.snapshot.online_count(),
            failed = report.failed(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "poll cycle published"
        );
        report
    }

    async fn collect(
        &self,
        nodes: Vec<NodeRecord>,
    ) -> (
        BTreeMap<NodeId, NodeTelemetrySnapshot>,
        BTreeMap<NodeId, NodePhase>,
    ) {
        let permits = self
            .max_concurrency
            .unwrap_or(nodes.len())
            .min(nodes.len())
            .max(1);
        let semaphore = Arc::new(Semaphore::new(permits));

        let mut tasks = JoinSet::new();
        let mut owners = HashMap::new();
        for node in nodes {
            debug!(node_id = node.id, phase = ?NodePhase::Pending, "node queued");
            let source = Arc::clone(&self.source);
            let semaphore = Arc::clone(&semaphore);
            let task_node = node.clone();
            let handle = tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                poll_node(source.as_ref(), &task_node).await
            });
            owners.insert(handle.id(), node);
        }

        let mut results = BTreeMap::new();
        let mut outcomes = BTreeMap::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            let snapshot = match joined {
                Ok((_, snapshot)) => snapshot,
                Err(e) => {
                    let Some(node) = owners.get(&e.id()) else {
                        error!(error = %e, "telemetry task for unknown node failed");
                        continue;
                    };
                    error!(node_id = node.id, error = %e, "telemetry task failed");
                    offline_snapshot(
                        node,
                        TelemetryError::Internal(format!("telemetry task failed: {e}")),
                        epoch_millis(),
                    )
                }
            };
            let phase = if snapshot.error.is_none() {
                NodePhase::Succeeded
            } else {
                NodePhase::Failed
            };
            outcomes.insert(snapshot.node_id, phase);
            results.insert(snapshot.node_id, snapshot);
        }
        (results, outcomes)
    }
}

async fn poll_node<F: TelemetrySource>(source: &F, node: &NodeRecord) -> NodeTelemetrySnapshot {
    debug!(node_id = node.id, phase = ?NodePhase::Fetching, "fetching telemetry");
    let result = source.fetch(node).await;
    let fetched_at = epoch_millis();

    match &result {
        Ok(workloads) => {
            debug!(
                node_id = node.id,
                phase = ?NodePhase::Succeeded,
                workloads = workloads.len(),
                "telemetry fetched"
            );
        }
        Err(failure) => {
            warn!(
                node_id = node.id,
                phase = ?NodePhase::Failed,
                kind = failure.cause.kind(),
                retryable = failure.cause.is_retryable(),
                error = %failure.cause,
                "telemetry fetch failed"
            );
        }
    }
    aggregate(node, &result, fetched_at)
}
