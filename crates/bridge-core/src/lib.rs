//! # bridge-core: Pure Logic for the Attendance Bridge
//!
//! This crate holds everything the bridge decides without talking to the
//! outside world: the record types exchanged with the local terminal server
//! and the cloud attendance service, the user diff, and the shape of the
//! attendance upload.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Attendance Bridge Architecture                      │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              bridge-daemon (scheduler + CLI)                    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │   bridge-sync: LocalClient, CloudClient, Orchestrator           │   │
//! │  └───────────────┬─────────────────────────────┬───────────────────┘   │
//! │                  │                             │                        │
//! │  ┌───────────────▼────────────┐   ┌────────────▼───────────────────┐   │
//! │  │  ★ bridge-core (HERE) ★    │   │  bridge-db (SQLite)            │   │
//! │  │  types • reconcile         │◄──│  tokens • attendance_data      │   │
//! │  │  NO I/O • PURE FUNCTIONS   │   │                                │   │
//! │  └────────────────────────────┘   └────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Records exchanged with both remote systems and the store
//! - [`reconcile`] - User diffing and upload batch construction
//! - [`validation`] - Parsing of loosely-typed remote fields
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use bridge_core::reconcile::{reconcile_users, UserAction, UserSyncContext};
//! use bridge_core::CloudUser;
//!
//! let ctx = UserSyncContext::new(
//!     vec![],
//!     vec![CloudUser::new(1, "A1", "Jane")],
//! );
//! let plan = reconcile_users(&ctx);
//!
//! assert_eq!(
//!     plan.actions,
//!     vec![UserAction::Create { emp_code: 1, first_name: "A1 Jane".into() }]
//! );
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod reconcile;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use reconcile::{ReconcilePlan, UserAction, UserSyncContext};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Wire format of punch and upload timestamps on both remote systems.
///
/// Timestamps are local wall-clock time with no zone information.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
