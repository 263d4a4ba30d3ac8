//! In-process snapshot store.

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::SnapshotStore;
use crate::aggregate::BenchmarkSnapshot;
use crate::error::StoreError;

/// Keeps snapshots in append order behind an async lock.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<Vec<BenchmarkSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn append(&self, snapshot: &BenchmarkSnapshot) -> Result<(), StoreError> {
        let mut snapshots = self.snapshots.write().await;
        if snapshots
            .iter()
            .any(|s| s.snapshot_id == snapshot.snapshot_id)
        {
            return Err(StoreError::Duplicate(snapshot.snapshot_id));
        }
        snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<BenchmarkSnapshot>, StoreError> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots.iter().find(|s| s.snapshot_id == id).cloned())
    }

    async fn latest(&self) -> Result<Option<BenchmarkSnapshot>, StoreError> {
        let snapshots = self.snapshots.read().await;
        // max_by_key keeps the last maximum, so later appends win ties
        Ok(snapshots.iter().max_by_key(|s| s.created_at).cloned())
    }

    async fn list_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots.iter().map(|s| s.snapshot_id).collect())
    }
}
