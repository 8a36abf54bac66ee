//! # Sync Orchestrator
//!
//! Turns a [`Trigger`] into calls on the two clients and the engine.
//!
//! ## Triggers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          run(trigger)                                   │
//! │                                                                         │
//! │  Heartbeat       since = latest stored punch, else now - 6 h           │
//! │                  list_transactions(since) → ingest → upload if new     │
//! │                                                                         │
//! │  Backfill(L)     since = now - L                                       │
//! │                  list_transactions(since) → ingest → upload if new     │
//! │                                                                         │
//! │  UserSync        refs (cached) → local + cloud lists → reconcile       │
//! │                  → create/update/delete in order, stop at first error  │
//! │                  (a failed create/update drops the cached refs)        │
//! │                                                                         │
//! │  ForcedUpload    upload_pending                                        │
//! │                                                                         │
//! │  RetentionSweep  purge_old(now - days)                                 │
//! │                                                                         │
//! │  ResetAuth       purge tokens → authenticate                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Triggers may run concurrently. The store's unique transaction id and the
//! client's login lock are what keep that safe; the orchestrator holds no
//! mutable state besides the resolved reference ids.

use std::fmt;

use chrono::NaiveDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use bridge_core::reconcile::{reconcile_users, retention_cutoff, UserAction, UserSyncContext};
use bridge_core::validation::format_timestamp;
use bridge_core::{EmployeePayload, ReferenceIds};
use bridge_db::Database;

use crate::cloud::CloudClient;
use crate::config::BridgeConfig;
use crate::engine::{PurgeReport, ReconciliationEngine, UploadOutcome};
use crate::error::{SyncError, SyncResult};
use crate::local::LocalClient;

// =============================================================================
// Triggers and Reports
// =============================================================================

/// A unit of scheduled (or manual) work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Pull punches since the newest stored one.
    Heartbeat,
    /// Pull punches from a fixed window back.
    Backfill { lookback: chrono::Duration },
    /// Mirror cloud users onto the local server.
    UserSync,
    /// Upload whatever is pending.
    ForcedUpload,
    /// Delete old synced rows and expired tokens.
    RetentionSweep,
    /// Drop all tokens and log in again.
    ResetAuth,
}

impl Trigger {
    pub fn name(&self) -> &'static str {
        match self {
            Trigger::Heartbeat => "heartbeat",
            Trigger::Backfill { .. } => "backfill",
            Trigger::UserSync => "user_sync",
            Trigger::ForcedUpload => "forced_upload",
            Trigger::RetentionSweep => "retention_sweep",
            Trigger::ResetAuth => "reset_auth",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Backfill { lookback } => {
                write!(f, "backfill ({} min)", lookback.num_minutes())
            }
            other => f.write_str(other.name()),
        }
    }
}

/// What a trigger accomplished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerReport {
    Attendance {
        since: NaiveDateTime,
        fetched: usize,
        new_rows: bool,
        upload: Option<UploadOutcome>,
    },
    Users {
        created: usize,
        updated: usize,
        deleted: usize,
        skipped: usize,
    },
    Upload(UploadOutcome),
    Retention(PurgeReport),
    AuthReset,
}

impl fmt::Display for TriggerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerReport::Attendance {
                since,
                fetched,
                new_rows,
                upload,
            } => {
                write!(
                    f,
                    "fetched {} punches since {} (new: {})",
                    fetched,
                    format_timestamp(since),
                    new_rows
                )?;
                if let Some(UploadOutcome::Uploaded { count }) = upload {
                    write!(f, ", uploaded {}", count)?;
                }
                Ok(())
            }
            TriggerReport::Users {
                created,
                updated,
                deleted,
                skipped,
            } => write!(
                f,
                "created {}, updated {}, deleted {}, skipped {}",
                created, updated, deleted, skipped
            ),
            TriggerReport::Upload(UploadOutcome::NothingPending) => f.write_str("nothing pending"),
            TriggerReport::Upload(UploadOutcome::Uploaded { count }) => {
                write!(f, "uploaded {}", count)
            }
            TriggerReport::Retention(report) => write!(
                f,
                "deleted {} rows, {} tokens, {} remote punches",
                report.attendance_deleted, report.tokens_deleted, report.remote_deleted
            ),
            TriggerReport::AuthReset => f.write_str("authentication reset"),
        }
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Owns both clients and the engine; runs triggers against them.
pub struct SyncOrchestrator {
    config: BridgeConfig,
    local: LocalClient,
    cloud: CloudClient,
    engine: ReconciliationEngine,
    db: Database,
    refs: Mutex<Option<ReferenceIds>>,
}

impl SyncOrchestrator {
    /// Builds both clients from `config`. Nothing is requested yet.
    pub fn new(config: BridgeConfig, db: Database) -> SyncResult<Self> {
        let local = LocalClient::new(&config.local, db.tokens())?;
        let cloud = CloudClient::new(&config.cloud)?;

        Ok(SyncOrchestrator {
            engine: ReconciliationEngine::new(db.clone()),
            config,
            local,
            cloud,
            db,
            refs: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn local(&self) -> &LocalClient {
        &self.local
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Runs one trigger to completion.
    pub async fn run(&self, trigger: Trigger) -> SyncResult<TriggerReport> {
        debug!(trigger = %trigger, "Trigger started");

        let report = match trigger {
            Trigger::Heartbeat => self.heartbeat().await?,
            Trigger::Backfill { lookback } => self.pull_attendance(now() - lookback).await?,
            Trigger::UserSync => self.sync_users().await?,
            Trigger::ForcedUpload => {
                TriggerReport::Upload(self.engine.upload_pending(&self.cloud).await?)
            }
            Trigger::RetentionSweep => self.retention_sweep().await?,
            Trigger::ResetAuth => {
                self.local.reset_authentication().await?;
                TriggerReport::AuthReset
            }
        };

        info!(trigger = %trigger, result = %report, "Trigger finished");
        Ok(report)
    }

    // =========================================================================
    // Attendance
    // =========================================================================

    async fn heartbeat(&self) -> SyncResult<TriggerReport> {
        let since = match self.db.attendance().latest_timestamp().await? {
            Some(latest) => latest,
            None => now() - self.config.schedule.default_lookback(),
        };

        self.pull_attendance(since).await
    }

    async fn pull_attendance(&self, since: NaiveDateTime) -> SyncResult<TriggerReport> {
        let punches = self.local.list_transactions(since).await?;
        let new_rows = self.engine.ingest_attendance(&punches).await?;

        let upload = if new_rows {
            Some(self.engine.upload_pending(&self.cloud).await?)
        } else {
            None
        };

        Ok(TriggerReport::Attendance {
            since,
            fetched: punches.len(),
            new_rows,
            upload,
        })
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Area and department ids, resolved on first use and cached until
    /// an employee write fails.
    async fn reference_ids(&self) -> SyncResult<ReferenceIds> {
        let mut cached = self.refs.lock().await;
        if let Some(refs) = *cached {
            return Ok(refs);
        }

        let refs = self
            .local
            .verify_area_and_department(&self.config.reference)
            .await?;
        *cached = Some(refs);
        Ok(refs)
    }

    /// Drops the cached ids so the next user sync resolves them again.
    async fn forget_reference_ids(&self) {
        self.refs.lock().await.take();
    }

    async fn sync_users(&self) -> SyncResult<TriggerReport> {
        let refs = self.reference_ids().await?;

        let (local_users, cloud_users) =
            tokio::try_join!(self.local.list_employees(), self.cloud.list_users())?;
        let ctx = UserSyncContext::new(local_users, cloud_users);
        let plan = reconcile_users(&ctx);

        for local_id in &plan.skipped {
            warn!(local_id = local_id, "Skipping employee with non-numeric code");
        }

        for action in &plan.actions {
            if let Err(e) = self.apply(action, refs).await {
                // the area or department may have been removed on the server
                if !matches!(action, UserAction::Delete { .. }) {
                    warn!(
                        action = %action,
                        area_id = refs.area_id,
                        department_id = refs.department_id,
                        "Employee write failed, reference ids will be resolved again"
                    );
                    self.forget_reference_ids().await;
                }
                return Err(SyncError::ReconciliationAction {
                    action: action.to_string(),
                    source: Box::new(e),
                });
            }
            debug!(action = %action, "Applied user action");
        }

        Ok(TriggerReport::Users {
            created: plan.count("create"),
            updated: plan.count("update"),
            deleted: plan.count("delete"),
            skipped: plan.skipped.len(),
        })
    }

    async fn apply(&self, action: &UserAction, refs: ReferenceIds) -> SyncResult<()> {
        match action {
            UserAction::Create {
                emp_code,
                first_name,
            } => {
                self.local
                    .create_employee(&EmployeePayload::new(*emp_code, first_name.as_str(), refs))
                    .await?;
            }
            UserAction::Update {
                local_id,
                emp_code,
                first_name,
            } => {
                self.local
                    .update_employee(
                        *local_id,
                        &EmployeePayload::new(*emp_code, first_name.as_str(), refs),
                    )
                    .await?;
            }
            UserAction::Delete { local_id, .. } => {
                self.local.delete_employee(*local_id).await?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Retention
    // =========================================================================

    async fn retention_sweep(&self) -> SyncResult<TriggerReport> {
        let retention = &self.config.retention;
        let cutoff = retention_cutoff(now(), retention.days);
        let remote = retention.purge_remote_transactions.then_some(&self.local);

        Ok(TriggerReport::Retention(
            self.engine.purge_old(cutoff, remote).await?,
        ))
    }
}

/// Wall-clock time in the bridge's zone; both remote systems use local time.
fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}
