//! # Field Validation
//!
//! Parsing helpers for the loosely-typed fields both remote systems send.
//!
//! ## Why This Exists
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Remote Field Shapes                                 │
//! │                                                                         │
//! │  Local server employee:   { "emp_code": "5",  ... }   ← string         │
//! │  Local server punch:      { "emp_code": 5,    ... }   ← number         │
//! │  Cloud user:              { "id": 5,          ... }   ← number         │
//! │                                                                         │
//! │  All three must compare equal, so identifiers are parsed to i64        │
//! │  here and compared numerically, never as strings.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDateTime;

use crate::error::{ValidationError, ValidationResult};
use crate::TIMESTAMP_FORMAT;

/// Longest area/department code the local server accepts.
pub const MAX_REFERENCE_CODE_LEN: usize = 30;

/// Parses a numeric identifier that may arrive as a padded string.
///
/// ## Example
/// ```rust
/// use bridge_core::validation::parse_identifier;
///
/// assert_eq!(parse_identifier("emp_code", " 0042 ").unwrap(), 42);
/// assert!(parse_identifier("emp_code", "A-17").is_err());
/// ```
pub fn parse_identifier(field: &str, raw: &str) -> ValidationResult<i64> {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    trimmed
        .parse::<i64>()
        .map_err(|_| ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: format!("'{}' is not a number", trimmed),
        })
}

/// Parses a `YYYY-MM-DD HH:MM:SS` punch time.
pub fn parse_punch_time(raw: &str) -> ValidationResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).map_err(|e| {
        ValidationError::InvalidFormat {
            field: "punch_time".to_string(),
            reason: format!("'{}': {}", raw, e),
        }
    })
}

/// Formats a timestamp the way both remote systems expect it.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Validates a configured area or department code.
///
/// ## Rules
/// - Must not be empty
/// - At most [`MAX_REFERENCE_CODE_LEN`] characters
pub fn validate_reference_code(field: &str, code: &str) -> ValidationResult<()> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if code.chars().count() > MAX_REFERENCE_CODE_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_REFERENCE_CODE_LEN,
        });
    }

    Ok(())
}
