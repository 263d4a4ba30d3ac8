//! SQLite-backed snapshot history.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::SnapshotStore;
use crate::aggregate::BenchmarkSnapshot;
use crate::error::StoreError;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS benchmark_snapshots (
    snapshot_id         TEXT    PRIMARY KEY,
    created_at          TEXT    NOT NULL,
    repository_count    INTEGER NOT NULL,
    treatment_count     INTEGER NOT NULL,
    significance_method TEXT    NOT NULL,

    -- Full snapshot as JSON
    payload             TEXT    NOT NULL,

    stored_at           TEXT    NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_benchmark_snapshots_created ON benchmark_snapshots(created_at);
"#;

/// Snapshot store over a SQLite file in WAL mode.
#[derive(Clone)]
pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    /// Opens (creating if missing) the database at `path` and applies the
    /// schema.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;

        sqlx::query(SCHEMA_SQL).execute(&pool).await?;

        tracing::info!(path = path, "Snapshot store opened");
        Ok(Self { pool })
    }

    pub async fn count(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM benchmark_snapshots")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n") as u64)
    }

    fn decode(id: &str, payload: &str) -> Result<BenchmarkSnapshot, StoreError> {
        serde_json::from_str(payload).map_err(|e| StoreError::Corrupt {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Fixed-width timestamp so text ordering matches time ordering.
fn sortable_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn append(&self, snapshot: &BenchmarkSnapshot) -> Result<(), StoreError> {
        let payload = serde_json::to_string(snapshot)?;

        let inserted = sqlx::query(
            "INSERT INTO benchmark_snapshots (
                snapshot_id, created_at, repository_count, treatment_count,
                significance_method, payload
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(snapshot.snapshot_id.to_string())
        .bind(sortable_timestamp(snapshot.created_at))
        .bind(snapshot.repository_count as i64)
        .bind(snapshot.rankings.len() as i64)
        .bind(&snapshot.significance_method)
        .bind(payload)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => {
                tracing::debug!(snapshot_id = %snapshot.snapshot_id, "Snapshot stored");
                Ok(())
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::Duplicate(snapshot.snapshot_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<BenchmarkSnapshot>, StoreError> {
        let id = id.to_string();
        let row = sqlx::query("SELECT payload FROM benchmark_snapshots WHERE snapshot_id = ?1")
            .bind(&id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| Self::decode(&id, row.get("payload")))
            .transpose()
    }

    async fn latest(&self) -> Result<Option<BenchmarkSnapshot>, StoreError> {
        let row = sqlx::query(
            "SELECT snapshot_id, payload FROM benchmark_snapshots
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let id: String = row.get("snapshot_id");
            Self::decode(&id, row.get("payload"))
        })
        .transpose()
    }

    async fn list_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        let rows = sqlx::query("SELECT snapshot_id FROM benchmark_snapshots ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let id: String = row.get("snapshot_id");
                Uuid::parse_str(&id).map_err(|e| StoreError::Corrupt {
                    id,
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}
