//! # bridge-sync: HTTP Clients and Sync Engine
//!
//! Everything that talks to the local terminal server or the cloud, and the
//! triggers that decide when.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Bridge Sync Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Scheduler: one tokio task per trigger, own interval each        │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               ▼                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  SyncOrchestrator::run(Trigger)                                  │  │
//! │  └──────┬──────────────────────┬───────────────────────┬────────────┘  │
//! │         ▼                      ▼                       ▼               │
//! │  ┌────────────────┐  ┌──────────────────────┐  ┌────────────────────┐  │
//! │  │  LocalClient   │  │ ReconciliationEngine │  │   CloudClient      │  │
//! │  │                │  │                      │  │                    │  │
//! │  │ JWT auth with  │  │ ingest / upload /    │  │ users (has_more)   │  │
//! │  │ single renewal │  │ purge on bridge-db   │  │ attendance upload  │  │
//! │  │ paged lists    │  │                      │  │ ?token= auth       │  │
//! │  └───────┬────────┘  └──────────────────────┘  └─────────┬──────────┘  │
//! │          │              PagedFetcher (shared)            │              │
//! │          ▼                                               ▼              │
//! │   local terminal server                           cloud service        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`] - `bridge.toml` loading, env overrides, validation
//! - [`error`] - Sync error types
//! - [`fetcher`] - Page walking for both list envelopes
//! - [`local`] - Local server client and its auth state machine
//! - [`cloud`] - Cloud client
//! - [`engine`] - Ingest, upload, purge against the store
//! - [`orchestrator`] - Trigger execution
//! - [`scheduler`] - Interval tasks
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use bridge_sync::{scheduler, BridgeConfig, SyncOrchestrator, Trigger};
//!
//! let config = BridgeConfig::load(None)?;
//! let orchestrator = Arc::new(SyncOrchestrator::new(config.clone(), database)?);
//!
//! // one-off
//! orchestrator.run(Trigger::UserSync).await?;
//!
//! // or forever
//! let handle = scheduler::spawn(orchestrator, scheduler::plan(&config.schedule));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cloud;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod local;
pub mod orchestrator;
pub mod scheduler;

pub(crate) mod http;

#[cfg(test)]
pub(crate) mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use cloud::CloudClient;
pub use config::{BridgeConfig, CloudSettings, LocalSettings, ReferenceSettings, ScheduleSettings};
pub use engine::{PurgeReport, ReconciliationEngine, UploadOutcome};
pub use error::{SyncError, SyncResult};
pub use local::{AuthState, LocalClient};
pub use orchestrator::{SyncOrchestrator, Trigger, TriggerReport};
pub use scheduler::{ScheduledTrigger, SchedulerHandle, TriggerRunner};
