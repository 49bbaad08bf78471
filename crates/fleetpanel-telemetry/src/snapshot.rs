//! Latest published fleet snapshot.

use std::sync::Arc;

use tokio::sync::watch;

use crate::types::FleetSnapshot;

/// Holds the most recent complete [`FleetSnapshot`].
///
/// Publishing replaces the whole snapshot in one step, so a reader sees
/// either the previous cycle or the new one, never a mix. Reads never wait
/// on an in-flight poll.
#[derive(Clone)]
pub struct SnapshotStore {
    tx: Arc<watch::Sender<Arc<FleetSnapshot>>>,
}

impl SnapshotStore {
    /// Start with an empty cycle-0 snapshot.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(FleetSnapshot::default()));
        Self { tx: Arc::new(tx) }
    }

    pub fn latest(&self) -> Arc<FleetSnapshot> {
        Arc::clone(&self.tx.borrow())
    }

    pub fn publish(&self, snapshot: FleetSnapshot) -> Arc<FleetSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.tx.send_replace(Arc::clone(&snapshot));
        snapshot
    }

    /// Receiver notified on every publish.
    pub fn subscribe(&self) -> watch::Receiver<Arc<FleetSnapshot>> {
        self.tx.subscribe()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
