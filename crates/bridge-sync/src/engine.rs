//! # Reconciliation Engine
//!
//! Store-side steps shared by every trigger: ingesting punches, uploading
//! what the cloud has not seen, and purging what it has.
//!
//! ## Attendance Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Attendance Lifecycle                             │
//! │                                                                         │
//! │  local server         attendance_data              cloud               │
//! │  ────────────         ───────────────              ─────               │
//! │  RemotePunch ──ingest──► synced = 0                                    │
//! │                            │                                            │
//! │                            │ upload_pending: one POST for all rows     │
//! │                            ├── 2xx ──► synced = 1 (those rows only) ──► │
//! │                            └── fail ─► unchanged, next trigger retries │
//! │                                                                         │
//! │                         synced = 1 AND timestamp <= now - N days       │
//! │                            │                                            │
//! │                            └── purge_old ──► deleted                   │
//! │                                 (optionally also on the local server)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ingestion is idempotent: a punch whose transaction id is already stored
//! is skipped, so overlapping heartbeat and backfill windows are harmless.

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use bridge_core::reconcile::build_upload_batch;
use bridge_core::{NewAttendance, RemotePunch};
use bridge_db::Database;

use crate::cloud::CloudClient;
use crate::error::{SyncError, SyncResult};
use crate::local::LocalClient;

/// What `upload_pending` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// No unsynced rows; the cloud was not called.
    NothingPending,
    /// The cloud accepted `count` rows and they are now marked synced.
    Uploaded { count: usize },
}

/// What `purge_old` removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub attendance_deleted: u64,
    pub tokens_deleted: u64,
    /// Punches also deleted on the local server.
    pub remote_deleted: u64,
}

/// Store-backed attendance steps.
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    db: Database,
}

impl ReconciliationEngine {
    pub fn new(db: Database) -> Self {
        ReconciliationEngine { db }
    }

    /// Stores punches not seen before.
    ///
    /// A punch with a non-numeric employee code or a malformed time is
    /// logged and skipped; the rest of the batch is still stored.
    ///
    /// ## Returns
    /// `true` if at least one new row was inserted.
    pub async fn ingest_attendance(&self, punches: &[RemotePunch]) -> SyncResult<bool> {
        let mut rows: Vec<NewAttendance> = Vec::with_capacity(punches.len());
        let mut skipped = 0usize;

        for punch in punches {
            match punch.to_new_attendance() {
                Ok(row) => rows.push(row),
                Err(e) => {
                    skipped += 1;
                    warn!(
                        attn_id = punch.id,
                        emp_code = %punch.emp_code,
                        punch_time = %punch.punch_time,
                        error = %e,
                        "Skipping unusable punch"
                    );
                }
            }
        }

        let inserted = self.db.attendance().ingest(&rows).await?;

        debug!(
            received = punches.len(),
            skipped = skipped,
            inserted = inserted,
            "Ingested attendance"
        );
        Ok(inserted > 0)
    }

    /// Uploads every unsynced row in one request and marks exactly those
    /// rows synced on success.
    ///
    /// On failure nothing is marked, and the same rows go out with the next
    /// trigger.
    pub async fn upload_pending(&self, cloud: &CloudClient) -> SyncResult<UploadOutcome> {
        let attendance = self.db.attendance();
        let pending = attendance.get_pending().await?;

        if pending.is_empty() {
            debug!("No pending attendance to upload");
            return Ok(UploadOutcome::NothingPending);
        }

        let batch = build_upload_batch(&pending);
        cloud.upload_attendance(&batch).await?;

        let ids: Vec<i64> = pending.iter().map(|r| r.id).collect();
        let marked = attendance.mark_synced(&ids).await?;

        info!(
            uploaded = pending.len(),
            marked = marked,
            "Pending attendance synced"
        );
        Ok(UploadOutcome::Uploaded {
            count: pending.len(),
        })
    }

    /// Deletes synced rows at or before `cutoff` and expired tokens.
    ///
    /// With `remote` set, each purged punch is first deleted on the local
    /// server too. A punch the server no longer has (404) counts as deleted;
    /// any other failure aborts before the store is touched.
    pub async fn purge_old(
        &self,
        cutoff: NaiveDateTime,
        remote: Option<&LocalClient>,
    ) -> SyncResult<PurgeReport> {
        let attendance = self.db.attendance();
        let mut report = PurgeReport::default();

        if let Some(local) = remote {
            for record in attendance.find_synced_before(cutoff).await? {
                match local.delete_transaction(record.source_attn_id).await {
                    Ok(()) => report.remote_deleted += 1,
                    Err(SyncError::RemoteCall { status: 404, .. }) => {
                        warn!(
                            attn_id = record.source_attn_id,
                            "Transaction already gone from local server"
                        );
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        report.attendance_deleted = attendance.purge_synced_before(cutoff).await?;
        report.tokens_deleted = self.db.tokens().delete_expired().await?;

        info!(
            cutoff = %cutoff,
            attendance_deleted = report.attendance_deleted,
            tokens_deleted = report.tokens_deleted,
            remote_deleted = report.remote_deleted,
            "Retention purge complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_db, MockServer};
    use bridge_core::validation::parse_punch_time;
    use serde_json::json;

    fn ts(raw: &str) -> NaiveDateTime {
        parse_punch_time(raw).unwrap()
    }

    #[tokio::test]
    async fn test_ingest_is_idempotent() {
        let db = memory_db().await;
        let engine = ReconciliationEngine::new(db.clone());
        let punches = vec![
            RemotePunch::new(1, "5", "2024-01-01 08:00:00"),
            RemotePunch::new(2, "6", "2024-01-01 08:05:00"),
        ];

        assert!(engine.ingest_attendance(&punches).await.unwrap());
        assert!(!engine.ingest_attendance(&punches).await.unwrap());
        assert_eq!(db.attendance().count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_ingest_empty_batch() {
        let db = memory_db().await;
        let engine = ReconciliationEngine::new(db);
        assert!(!engine.ingest_attendance(&[]).await.unwrap());
    }

    #[tokio::test]
    async fn test_unusable_punch_does_not_block_the_batch() {
        let db = memory_db().await;
        let engine = ReconciliationEngine::new(db.clone());
        let punches = vec![
            RemotePunch::new(1, "VISITOR", "2024-01-01 08:00:00"),
            RemotePunch::new(2, "5", "2024-01-01 09:00:00"),
            RemotePunch::new(3, "6", "01/01/2024 09:30"),
            RemotePunch::new(4, "6", "2024-01-01 10:00:00"),
        ];

        assert!(engine.ingest_attendance(&punches).await.unwrap());

        let attendance = db.attendance();
        assert_eq!(attendance.count().await.unwrap(), 2);
        assert!(attendance.get_by_attn_id(1).await.unwrap().is_none());
        assert!(attendance.get_by_attn_id(2).await.unwrap().is_some());
        assert_eq!(
            attendance.latest_timestamp().await.unwrap(),
            Some(ts("2024-01-01 10:00:00"))
        );

        // the same window again stores nothing new
        assert!(!engine.ingest_attendance(&punches).await.unwrap());
        assert_eq!(attendance.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_batch_of_only_unusable_punches() {
        let db = memory_db().await;
        let engine = ReconciliationEngine::new(db.clone());

        let new_rows = engine
            .ingest_attendance(&[RemotePunch::new(1, "VISITOR", "2024-01-01 08:00:00")])
            .await
            .unwrap();

        assert!(!new_rows);
        assert_eq!(db.attendance().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upload_marks_rows_synced() {
        let server = MockServer::start().await;
        let db = memory_db().await;
        let engine = ReconciliationEngine::new(db.clone());
        let cloud = CloudClient::new(&server.config().cloud).unwrap();

        engine
            .ingest_attendance(&[RemotePunch::new(100, "5", "2024-01-01 08:00:00")])
            .await
            .unwrap();

        let outcome = engine.upload_pending(&cloud).await.unwrap();

        assert_eq!(outcome, UploadOutcome::Uploaded { count: 1 });
        assert_eq!(
            server.state().uploads,
            vec![json!([{ "user_id": 5, "timestamp": "2024-01-01 08:00:00" }])]
        );
        assert_eq!(db.attendance().count_pending().await.unwrap(), 0);

        // nothing left: no second request
        assert_eq!(
            engine.upload_pending(&cloud).await.unwrap(),
            UploadOutcome::NothingPending
        );
        assert_eq!(server.state().uploads.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_upload_marks_nothing() {
        let server = MockServer::start().await;
        let db = memory_db().await;
        let engine = ReconciliationEngine::new(db.clone());
        let cloud = CloudClient::new(&server.config().cloud).unwrap();
        server.state().upload_status = 502;

        engine
            .ingest_attendance(&[
                RemotePunch::new(1, "5", "2024-01-01 08:00:00"),
                RemotePunch::new(2, "5", "2024-01-01 17:00:00"),
            ])
            .await
            .unwrap();

        let err = engine.upload_pending(&cloud).await.unwrap_err();

        assert!(matches!(err, SyncError::Upstream { status: 502, .. }));
        assert_eq!(db.attendance().count_pending().await.unwrap(), 2);

        // cloud recovers, same rows go out
        server.state().upload_status = 201;
        assert_eq!(
            engine.upload_pending(&cloud).await.unwrap(),
            UploadOutcome::Uploaded { count: 2 }
        );
    }

    #[tokio::test]
    async fn test_purge_removes_old_synced_rows_and_expired_tokens() {
        let db = memory_db().await;
        let engine = ReconciliationEngine::new(db.clone());
        let attendance = db.attendance();

        engine
            .ingest_attendance(&[
                RemotePunch::new(1, "5", "2024-01-01 08:00:00"),
                RemotePunch::new(2, "5", "2024-01-20 08:00:00"),
                RemotePunch::new(3, "6", "2024-01-01 09:00:00"),
            ])
            .await
            .unwrap();
        let synced: Vec<i64> = attendance
            .get_pending()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.source_attn_id != 3)
            .map(|r| r.id)
            .collect();
        attendance.mark_synced(&synced).await.unwrap();

        db.tokens().create("old").await.unwrap();
        db.tokens().invalidate_all().await.unwrap();
        db.tokens().create("current").await.unwrap();

        let report = engine
            .purge_old(ts("2024-01-10 00:00:00"), None)
            .await
            .unwrap();

        assert_eq!(
            report,
            PurgeReport {
                attendance_deleted: 1,
                tokens_deleted: 1,
                remote_deleted: 0,
            }
        );
        // unsynced row survives regardless of age
        assert!(attendance.get_by_attn_id(3).await.unwrap().is_some());
        assert!(attendance.get_by_attn_id(2).await.unwrap().is_some());
        assert_eq!(db.tokens().get_active().await.unwrap().unwrap().value, "current");
    }

    #[tokio::test]
    async fn test_purge_also_deletes_on_local_server() {
        let server = MockServer::start().await;
        let db = memory_db().await;
        let engine = ReconciliationEngine::new(db.clone());
        let local = LocalClient::new(&server.config().local, db.tokens()).unwrap();

        server.add_transaction(1, 5, "2024-01-01 08:00:00");
        engine
            .ingest_attendance(&[
                RemotePunch::new(1, "5", "2024-01-01 08:00:00"),
                // already removed from the server by someone else
                RemotePunch::new(2, "5", "2024-01-01 09:00:00"),
            ])
            .await
            .unwrap();
        let ids: Vec<i64> = db
            .attendance()
            .get_pending()
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        db.attendance().mark_synced(&ids).await.unwrap();

        let report = engine
            .purge_old(ts("2024-01-10 00:00:00"), Some(&local))
            .await
            .unwrap();

        assert_eq!(report.remote_deleted, 1);
        assert_eq!(report.attendance_deleted, 2);
        assert_eq!(server.state().deleted_transactions, vec![1]);
    }
}
