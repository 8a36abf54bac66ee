//! # Repository Module
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories                                         │
//! │                                                                         │
//! │  LocalClient                         ReconciliationEngine              │
//! │       │                                   │                             │
//! │       │  db.tokens().get_active()         │  db.attendance()            │
//! │       ▼                                   ▼                             │
//! │  TokenRepository                     AttendanceRepository               │
//! │  ├── get_active()                    ├── ingest(rows)                   │
//! │  ├── create(value)                   ├── get_pending()                  │
//! │  ├── invalidate_all()                ├── mark_synced(ids)               │
//! │  ├── purge_all()                     ├── latest_timestamp()             │
//! │  └── delete_expired()                └── purge_synced_before(cutoff)    │
//! │       │                                   │                             │
//! │       ▼                                   ▼                             │
//! │  bridge_tokens                       attendance_data                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`token::TokenRepository`] - JWT storage for the local server
//! - [`attendance::AttendanceRepository`] - Pulled punches and their sync state

pub mod attendance;
pub mod token;
