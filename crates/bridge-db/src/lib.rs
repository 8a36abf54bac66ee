//! # bridge-db: Database Layer for the Attendance Bridge
//!
//! The bridge keeps exactly two kinds of state between runs: the JWTs the
//! local server issued, and the punches it pulled but may not yet have
//! delivered to the cloud. Both live in one SQLite file.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Attendance Bridge Data Flow                        │
//! │                                                                         │
//! │  SyncOrchestrator (heartbeat / upload / retention)                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     bridge-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌─────────────────┐   ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories   │   │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │◄───│ TokenRepo       │   │  (embedded)  │  │   │
//! │  │   │ SqlitePool    │    │ AttendanceRepo  │   │ 001_init.sql │  │   │
//! │  │   └───────────────┘    └─────────────────┘   └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (bridge.db)                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Token and attendance repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bridge_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("bridge.db")).await?;
//!
//! let token = db.tokens().get_active().await?;
//! let pending = db.attendance().get_pending().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::attendance::AttendanceRepository;
pub use repository::token::TokenRepository;
