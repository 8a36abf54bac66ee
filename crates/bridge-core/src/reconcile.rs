//! # Reconciliation
//!
//! Decides what the bridge must change on the local server so its employee
//! list mirrors the cloud, and shapes pending attendance into one upload.
//!
//! ## User Reconciliation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      reconcile_users(ctx)                               │
//! │                                                                         │
//! │  PASS 1: for each cloud user (cloud order)                             │
//! │  ─────────────────────────────────────────                              │
//! │    local user with emp_code == cloud.id ?                              │
//! │      ├── no  ──────────────────────────────► CREATE                    │
//! │      └── yes ── first_name == "{uid} {name}" ?                         │
//! │                  ├── yes ──────────────────► (nothing)                 │
//! │                  └── no  ──────────────────► UPDATE                    │
//! │                                                                         │
//! │  PASS 2: for each local user (local order)                             │
//! │  ─────────────────────────────────────────                              │
//! │    emp_code not numeric ───────────────────► skipped (reported)        │
//! │    emp_code not among cloud ids ───────────► DELETE                    │
//! │                                                                         │
//! │  Output: [creates/updates..., deletes...]                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both lists travel in a [`UserSyncContext`] built fresh for each pass, so
//! nothing fetched by one trigger can leak stale state into the next.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{Duration, NaiveDateTime};

use crate::types::{AttendanceRecord, AttendanceUpload, CloudUser, LocalUser};

// =============================================================================
// Per-Pass Context
// =============================================================================

/// Everything one user-sync pass knows about both sides.
#[derive(Debug, Clone, Default)]
pub struct UserSyncContext {
    /// Employees currently on the local server.
    pub local_users: Vec<LocalUser>,

    /// Users currently on the cloud.
    pub cloud_users: Vec<CloudUser>,
}

impl UserSyncContext {
    /// Creates a context from freshly fetched lists.
    pub fn new(local_users: Vec<LocalUser>, cloud_users: Vec<CloudUser>) -> Self {
        UserSyncContext {
            local_users,
            cloud_users,
        }
    }
}

// =============================================================================
// Actions
// =============================================================================

/// A single change to apply on the local server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    /// Create an employee for a cloud user with no local counterpart.
    Create { emp_code: i64, first_name: String },

    /// Rename an existing employee to the canonical first name.
    Update {
        local_id: i64,
        emp_code: i64,
        first_name: String,
    },

    /// Remove an employee whose cloud user no longer exists.
    Delete { local_id: i64, emp_code: i64 },
}

impl UserAction {
    /// Short verb for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            UserAction::Create { .. } => "create",
            UserAction::Update { .. } => "update",
            UserAction::Delete { .. } => "delete",
        }
    }

    /// Employee code the action concerns.
    pub fn emp_code(&self) -> i64 {
        match self {
            UserAction::Create { emp_code, .. }
            | UserAction::Update { emp_code, .. }
            | UserAction::Delete { emp_code, .. } => *emp_code,
        }
    }
}

impl fmt::Display for UserAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserAction::Create {
                emp_code,
                first_name,
            } => write!(f, "create employee {} ('{}')", emp_code, first_name),
            UserAction::Update {
                local_id,
                emp_code,
                first_name,
            } => write!(
                f,
                "update employee {} (local id {}) to '{}'",
                emp_code, local_id, first_name
            ),
            UserAction::Delete { local_id, emp_code } => {
                write!(f, "delete employee {} (local id {})", emp_code, local_id)
            }
        }
    }
}

/// Result of diffing both user lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Actions in application order.
    pub actions: Vec<UserAction>,

    /// Local ids of employees whose code is not numeric. Left untouched.
    pub skipped: Vec<i64>,
}

impl ReconcilePlan {
    /// True if the local server already mirrors the cloud.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Number of actions of the given kind (`"create"`, `"update"`, `"delete"`).
    pub fn count(&self, kind: &str) -> usize {
        self.actions.iter().filter(|a| a.kind() == kind).count()
    }
}

// =============================================================================
// User Reconciliation
// =============================================================================

/// Computes the create/update/delete actions that converge the local server
/// onto the cloud user list.
///
/// ## Guarantees
/// - One action per diverged user, none for converged users
/// - Every local user with a numeric code absent from the cloud is deleted
///   exactly once
/// - Creates/updates come first in cloud order, deletes after in local order
pub fn reconcile_users(ctx: &UserSyncContext) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();

    // emp_code -> first local user holding it
    let mut local_by_code: HashMap<i64, &LocalUser> = HashMap::new();
    for user in &ctx.local_users {
        match user.emp_code_number() {
            Some(code) => {
                local_by_code.entry(code).or_insert(user);
            }
            None => plan.skipped.push(user.id),
        }
    }

    for cloud in &ctx.cloud_users {
        let first_name = cloud.canonical_first_name();

        match local_by_code.get(&cloud.id) {
            Some(local) if local.first_name == first_name => {}
            Some(local) => plan.actions.push(UserAction::Update {
                local_id: local.id,
                emp_code: cloud.id,
                first_name,
            }),
            None => plan.actions.push(UserAction::Create {
                emp_code: cloud.id,
                first_name,
            }),
        }
    }

    let cloud_ids: HashSet<i64> = ctx.cloud_users.iter().map(|u| u.id).collect();
    for local in &ctx.local_users {
        if let Some(code) = local.emp_code_number() {
            if !cloud_ids.contains(&code) {
                plan.actions.push(UserAction::Delete {
                    local_id: local.id,
                    emp_code: code,
                });
            }
        }
    }

    plan
}

// =============================================================================
// Attendance Helpers
// =============================================================================

/// Shapes pending rows into the cloud upload body, preserving order.
pub fn build_upload_batch(records: &[AttendanceRecord]) -> Vec<AttendanceUpload> {
    records.iter().map(AttendanceUpload::from).collect()
}

/// Oldest timestamp a synced row may have and still be kept.
///
/// Rows at or before the cutoff are eligible for deletion.
pub fn retention_cutoff(now: NaiveDateTime, days: u32) -> NaiveDateTime {
    now - Duration::days(i64::from(days))
}

// =============================================================================
// Unit Tests
// =============================================================================
