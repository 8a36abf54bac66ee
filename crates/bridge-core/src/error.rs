//! # Error Types
//!
//! Domain-specific error types for bridge-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  bridge-core errors (this file)                                        │
//! │  ├── CoreError        - Remote records that cannot be used             │
//! │  └── ValidationError  - Field-level parse/format failures              │
//! │                                                                         │
//! │  bridge-db errors (separate crate)                                     │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  bridge-sync errors (separate crate)                                   │
//! │  └── SyncError        - HTTP, auth and reconciliation failures         │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → trigger log line      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised while turning remote payloads into domain records.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A punch could not be converted into an attendance row.
    ///
    /// ## When This Occurs
    /// - `punch_time` is not `YYYY-MM-DD HH:MM:SS`
    /// - `emp_code` is not numeric
    #[error("Invalid punch {attn_id}: {source}")]
    InvalidPunch {
        attn_id: i64,
        #[source]
        source: ValidationError,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Field-level validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (e.g., non-numeric identifier, bad timestamp).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

/// Convenience type alias for Results with ValidationError.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Unit Tests
// =============================================================================
