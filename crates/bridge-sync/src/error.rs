//! # Sync Error Types
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │  Authentication │  │     Remote              │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Invalid-       │  │  Transport              │ │
//! │  │  InvalidUrl     │  │   Credentials   │  │  Upstream               │ │
//! │  │  ConfigLoad/    │  │  TokenExpired   │  │  RemoteCall             │ │
//! │  │   SaveFailed    │  │  (internal)     │  │  Decode                 │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   Reconcile     │  │    Storage      │  │      Internal           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Reconciliation-│  │  Database       │  │  Validation             │ │
//! │  │   Action        │  │                 │  │  Internal               │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every remote failure carries the URL, and where the server answered, the
//! status and body, so the trigger's final log line is enough to diagnose it.

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Every way a sync operation can fail.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A configured or derived URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to read or parse the config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to write the config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Authentication Errors
    // =========================================================================
    /// The local token endpoint rejected the username/password (HTTP 400).
    ///
    /// Never retried: repeating the same credentials cannot succeed.
    #[error("Local server rejected credentials for '{username}': {body}")]
    InvalidCredentials { username: String, body: String },

    /// An authenticated call was answered with a stale-token status.
    ///
    /// Consumed by the client's single renew-and-retry; callers only see it
    /// converted into [`SyncError::RemoteCall`].
    #[error("Token rejected by {url} (HTTP {status})")]
    TokenExpired {
        url: String,
        status: u16,
        body: String,
    },

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// Network failure or timeout before any response arrived.
    #[error("Request to {url} failed: {reason}")]
    Transport {
        url: String,
        reason: String,
        timed_out: bool,
    },

    /// Non-2xx from the cloud or the token endpoint.
    #[error("HTTP {status} from {url}: {body}")]
    Upstream {
        url: String,
        status: u16,
        body: String,
    },

    /// Non-2xx from an authenticated local call, after the renewal retry.
    #[error("{method} {url} returned HTTP {status}: {body}")]
    RemoteCall {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    /// A response body did not have the expected JSON shape.
    #[error("Unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },

    // =========================================================================
    // Reconciliation Errors
    // =========================================================================
    /// A user-sync action failed; the rest of the pass was abandoned.
    #[error("Reconciliation aborted at '{action}': {source}")]
    ReconciliationAction {
        action: String,
        #[source]
        source: Box<SyncError>,
    },

    // =========================================================================
    // Storage / Internal Errors
    // =========================================================================
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// A remote record could not be used.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Builds a `Transport` error from a reqwest failure.
    pub fn transport(url: impl Into<String>, err: &reqwest::Error) -> Self {
        SyncError::Transport {
            url: url.into(),
            reason: err.to_string(),
            timed_out: err.is_timeout(),
        }
    }

    /// Builds a `Decode` error.
    pub fn decode(url: impl Into<String>, reason: impl ToString) -> Self {
        SyncError::Decode {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// HTTP status attached to the error, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::TokenExpired { status, .. }
            | SyncError::Upstream { status, .. }
            | SyncError::RemoteCall { status, .. } => Some(*status),
            SyncError::ReconciliationAction { source, .. } => source.status(),
            _ => None,
        }
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<bridge_db::DbError> for SyncError {
    fn from(err: bridge_db::DbError) -> Self {
        SyncError::Database(err.to_string())
    }
}

impl From<bridge_core::CoreError> for SyncError {
    fn from(err: bridge_core::CoreError) -> Self {
        SyncError::Validation(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string()).unwrap_or_default();
        SyncError::transport(url, &err)
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Decode {
            url: String::new(),
            reason: err.to_string(),
        }
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if the next scheduled trigger may succeed where this one
    /// failed.
    ///
    /// ## Retryable Errors
    /// - Network failures and timeouts
    /// - 5xx answers
    /// - Transient storage errors
    ///
    /// ## Non-Retryable Errors
    /// - Rejected credentials and configuration errors
    /// - 4xx answers other than stale tokens
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { .. } | SyncError::TokenExpired { .. } => true,
            SyncError::Upstream { status, .. } | SyncError::RemoteCall { status, .. } => {
                *status >= 500
            }
            SyncError::ReconciliationAction { source, .. } => source.is_retryable(),
            SyncError::Database(_) => true,
            _ => false,
        }
    }

    /// Returns true if this error concerns local-server authentication.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidCredentials { .. } | SyncError::TokenExpired { .. }
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
                | SyncError::InvalidCredentials { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        let transport = SyncError::Transport {
            url: "http://local/".into(),
            reason: "connection refused".into(),
            timed_out: false,
        };
        let server_down = SyncError::Upstream {
            url: "http://cloud/".into(),
            status: 503,
            body: String::new(),
        };
        let bad_request = SyncError::RemoteCall {
            method: "POST".into(),
            url: "http://local/personnel/api/employees/".into(),
            status: 400,
            body: "{\"emp_code\":[\"exists\"]}".into(),
        };

        assert!(transport.is_retryable());
        assert!(server_down.is_retryable());
        assert!(!bad_request.is_retryable());
        assert!(!SyncError::InvalidConfig("page_size".into()).is_retryable());
    }

    #[test]
    fn test_credentials_are_auth_and_config_errors() {
        let err = SyncError::InvalidCredentials {
            username: "admin".into(),
            body: "{\"non_field_errors\":[\"Unable to log in\"]}".into(),
        };

        assert!(err.is_auth_error());
        assert!(err.is_config_error());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_reconciliation_error_wraps_cause() {
        let err = SyncError::ReconciliationAction {
            action: "delete employee 8 (local id 4)".into(),
            source: Box::new(SyncError::RemoteCall {
                method: "DELETE".into(),
                url: "http://local/personnel/api/employees/4/".into(),
                status: 500,
                body: "boom".into(),
            }),
        };

        let msg = err.to_string();
        assert!(msg.contains("delete employee 8"));
        assert!(msg.contains("HTTP 500"));
        assert_eq!(err.status(), Some(500));
        assert!(err.is_retryable());
    }
}
