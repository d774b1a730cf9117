use crate::protocol::{ControllerId, ControllerSnapshot};
use std::collections::HashMap;
use tokio::sync::watch;
use tracing::debug;

type SnapshotMap = HashMap<ControllerId, ControllerSnapshot>;

/// Latest snapshot per controller, written only by the protocol core
///
/// Backed by a watch channel: every write replaces whole snapshot values under
/// the channel lock, so a reader sees either the previous or the new snapshot
/// for an id, never a mix.
#[derive(Debug)]
pub struct ControllerStore {
    sender: watch::Sender<SnapshotMap>,
}

impl Default for ControllerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerStore {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(HashMap::new());
        Self { sender }
    }

    /// Replace the entry for the snapshot's id, returning the previous one
    pub fn apply(&self, snapshot: ControllerSnapshot) -> Option<ControllerSnapshot> {
        let id = snapshot.id;
        let mut previous = None;
        self.sender.send_modify(|map| {
            previous = map.insert(id, snapshot);
        });
        debug!(
            "Stored snapshot for controller {} (replaced: {})",
            id,
            previous.is_some()
        );
        previous
    }

    pub fn get(&self, id: ControllerId) -> Option<ControllerSnapshot> {
        self.sender.borrow().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sender.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sender.borrow().is_empty()
    }

    /// Read-only view for consumers
    pub fn reader(&self) -> StoreReader {
        StoreReader {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Read-only view of the [`ControllerStore`]; hands out copies
#[derive(Clone, Debug)]
pub struct StoreReader {
    receiver: watch::Receiver<SnapshotMap>,
}

impl StoreReader {
    /// Latest snapshot for `id`, `None` if it was never seen
    pub fn get(&self, id: ControllerId) -> Option<ControllerSnapshot> {
        self.receiver.borrow().get(&id).cloned()
    }

    /// All stored snapshots ordered by controller id
    pub fn all(&self) -> Vec<ControllerSnapshot> {
        let mut snapshots: Vec<_> = self.receiver.borrow().values().cloned().collect();
        snapshots.sort_by_key(|s| s.id);
        snapshots
    }

    pub fn ids(&self) -> Vec<ControllerId> {
        let mut ids: Vec<_> = self.receiver.borrow().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Wait until the store changes; false once the writer is gone
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }
}
