//! # Attendance Repository
//!
//! Stores punches pulled from the local server until the cloud accepts them.
//!
//! ## Row Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    attendance_data lifecycle                            │
//! │                                                                         │
//! │  heartbeat / backfill                                                  │
//! │       │  INSERT OR IGNORE ... (attn_id UNIQUE)                         │
//! │       ▼                                                                 │
//! │  ┌──────────────────┐   upload ok: UPDATE ... WHERE id IN (...)        │
//! │  │  synced = 0      │ ─────────────────────────────────────────┐       │
//! │  └──────────────────┘                                          │       │
//! │       ▲   upload failed: untouched, retried next trigger       ▼       │
//! │       │                                            ┌──────────────────┐│
//! │       └────────────────────────────────────────────│  synced = 1      ││
//! │                                                    └────────┬─────────┘│
//! │                                                             │          │
//! │                       retention: timestamp <= cutoff  ──────▼          │
//! │                                                         DELETE         │
//! │                                                                         │
//! │  Unsynced rows are never deleted, whatever their age.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use bridge_core::{AttendanceRecord, NewAttendance};
use chrono::NaiveDateTime;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::DbResult;

const RECORD_COLUMNS: &str = "id, user_id, timestamp, attn_id, synced";

/// Bound parameters per `IN (...)` list. Old SQLite builds cap a statement
/// at 999 variables.
const MAX_IDS_PER_STATEMENT: usize = 900;

/// Repository for `attendance_data`.
#[derive(Debug, Clone)]
pub struct AttendanceRepository {
    pool: SqlitePool,
}

impl AttendanceRepository {
    /// Creates a new AttendanceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AttendanceRepository { pool }
    }

    /// Inserts a row unless one with the same `attn_id` already exists.
    ///
    /// ## Returns
    /// `true` if a row was created.
    pub async fn insert_if_absent(&self, row: &NewAttendance) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO attendance_data (user_id, timestamp, attn_id, synced)
            VALUES (?1, ?2, ?3, 0)
            "#,
        )
        .bind(row.user_id)
        .bind(row.timestamp)
        .bind(row.source_attn_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Inserts every row whose `attn_id` is unseen, in one transaction.
    ///
    /// ## Returns
    /// Number of rows created. Zero if every punch was already stored.
    pub async fn ingest(&self, rows: &[NewAttendance]) -> DbResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut created = 0;

        for row in rows {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO attendance_data (user_id, timestamp, attn_id, synced)
                VALUES (?1, ?2, ?3, 0)
                "#,
            )
            .bind(row.user_id)
            .bind(row.timestamp)
            .bind(row.source_attn_id)
            .execute(&mut *tx)
            .await?;

            created += result.rows_affected();
        }

        tx.commit().await?;

        debug!(
            received = rows.len(),
            created = created,
            "Ingested attendance rows"
        );
        Ok(created)
    }

    /// Returns every row not yet accepted by the cloud, oldest first.
    pub async fn get_pending(&self) -> DbResult<Vec<AttendanceRecord>> {
        let rows = sqlx::query_as::<_, AttendanceRecord>(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM attendance_data
            WHERE synced = 0
            ORDER BY timestamp ASC, id ASC
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Marks exactly the given rows as synced.
    ///
    /// Rows ingested after the caller selected its batch are not touched.
    /// All ids are updated in a single transaction.
    pub async fn mark_synced(&self, ids: &[i64]) -> DbResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut marked = 0;

        for chunk in ids.chunks(MAX_IDS_PER_STATEMENT) {
            let mut query: QueryBuilder<Sqlite> =
                QueryBuilder::new("UPDATE attendance_data SET synced = 1 WHERE id IN (");

            let mut separated = query.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");

            marked += query.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;

        debug!(marked = marked, "Marked attendance rows synced");
        Ok(marked)
    }

    /// Timestamp of the newest stored punch, synced or not.
    pub async fn latest_timestamp(&self) -> DbResult<Option<NaiveDateTime>> {
        let latest: Option<NaiveDateTime> = sqlx::query_scalar(
            "SELECT timestamp FROM attendance_data ORDER BY timestamp DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(latest)
    }

    /// Synced rows at or before `cutoff`; what the next purge would delete.
    pub async fn find_synced_before(
        &self,
        cutoff: NaiveDateTime,
    ) -> DbResult<Vec<AttendanceRecord>> {
        let rows = sqlx::query_as::<_, AttendanceRecord>(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM attendance_data
            WHERE synced = 1 AND timestamp <= ?1
            ORDER BY timestamp ASC, id ASC
            "#
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Deletes synced rows at or before `cutoff`.
    ///
    /// ## Returns
    /// Number of deleted rows.
    pub async fn purge_synced_before(&self, cutoff: NaiveDateTime) -> DbResult<u64> {
        let result =
            sqlx::query("DELETE FROM attendance_data WHERE synced = 1 AND timestamp <= ?1")
                .bind(cutoff)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }

    /// Looks up a row by its local-server transaction id.
    pub async fn get_by_attn_id(&self, attn_id: i64) -> DbResult<Option<AttendanceRecord>> {
        let row = sqlx::query_as::<_, AttendanceRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM attendance_data WHERE attn_id = ?1"
        ))
        .bind(attn_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Counts rows waiting for upload.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM attendance_data WHERE synced = 0")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Counts all rows.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attendance_data")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
