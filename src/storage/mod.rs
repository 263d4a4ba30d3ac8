//! Append-only history of benchmark snapshots.
//!
//! # Overview
//!
//! - **SnapshotStore**: the keyed-record contract (append, get by id, latest)
//! - **MemorySnapshotStore**: process-local store for tests and one-shot runs
//! - **SqliteSnapshotStore**: durable SQLite store with the snapshot kept as
//!   a JSON payload
//!
//! # Usage
//!
//! ```rust,ignore
//! use treatment_bench::storage::{SnapshotStore, SqliteSnapshotStore};
//!
//! let store = SqliteSnapshotStore::open("./benchmark-snapshots.db").await?;
//! store.append(&snapshot).await?;
//! let latest = store.latest().await?;
//! ```

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use uuid::Uuid;

use crate::aggregate::BenchmarkSnapshot;
use crate::error::StoreError;

pub use memory::MemorySnapshotStore;
pub use sqlite::SqliteSnapshotStore;

/// Keyed, append-only snapshot storage.
///
/// Records are never updated or removed; appending an id that already
/// exists fails with `StoreError::Duplicate`.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn append(&self, snapshot: &BenchmarkSnapshot) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<BenchmarkSnapshot>, StoreError>;

    /// Most recent snapshot by `created_at`, later appends winning ties.
    async fn latest(&self) -> Result<Option<BenchmarkSnapshot>, StoreError>;

    /// All ids, oldest first.
    async fn list_ids(&self) -> Result<Vec<Uuid>, StoreError>;
}
