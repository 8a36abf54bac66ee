//! # Domain Types
//!
//! Records exchanged between the local terminal server, the cloud service,
//! and the bridge's own store.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  LOCAL SERVER                 CLOUD                  BRIDGE STORE       │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐   │
//! │  │   LocalUser     │   │   CloudUser     │   │   Token             │   │
//! │  │  id             │   │  id ◄───────────┼─┐ │  value, expired     │   │
//! │  │  emp_code ──────┼───┼─────────────────┘ │ │  created_at         │   │
//! │  │  first_name     │   │  unique_id      │   └─────────────────────┘   │
//! │  └─────────────────┘   │  name           │   ┌─────────────────────┐   │
//! │  ┌─────────────────┐   └─────────────────┘   │  AttendanceRecord   │   │
//! │  │  RemotePunch    │ ──── ingest ──────────► │  source_attn_id (U) │   │
//! │  │  id, emp_code   │                         │  synced             │   │
//! │  │  punch_time     │   ┌─────────────────┐   └──────────┬──────────┘   │
//! │  └─────────────────┘   │AttendanceUpload │ ◄── upload ──┘              │
//! │  ┌─────────────────┐   │ user_id         │                             │
//! │  │  AreaDept       │   │ timestamp       │                             │
//! │  └─────────────────┘   └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::validation::{format_timestamp, parse_identifier, parse_punch_time};

// =============================================================================
// Lenient Field Decoding
// =============================================================================

/// Serde helpers for fields that arrive as either numbers or strings.
mod lenient {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Int(i64),
        Float(f64),
        Str(String),
        Bool(bool),
    }

    impl Scalar {
        fn into_string(self) -> String {
            match self {
                Scalar::Int(n) => n.to_string(),
                Scalar::Float(f) => f.to_string(),
                Scalar::Str(s) => s,
                Scalar::Bool(b) => b.to_string(),
            }
        }
    }

    pub fn id<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        match Scalar::deserialize(d)? {
            Scalar::Int(n) => Ok(n),
            Scalar::Float(f) if f.fract() == 0.0 => Ok(f as i64),
            Scalar::Str(s) => s
                .trim()
                .parse()
                .map_err(|_| D::Error::custom(format!("identifier '{}' is not a number", s))),
            _ => Err(D::Error::custom("identifier must be an integer")),
        }
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(Option::<Scalar>::deserialize(d)?
            .map(Scalar::into_string)
            .unwrap_or_default())
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(Option::<Scalar>::deserialize(d)?.map(Scalar::into_string))
    }
}

// =============================================================================
// Token
// =============================================================================

/// A bearer token issued by the local server's JWT endpoint.
///
/// ## Lifecycle
/// ```text
/// authenticate() ──► created (expired = false)
///                        │
///     400 from a call ───┤──► expired = true ──► deleted by retention sweep
///                        │
///     reset_authentication() ──► deleted immediately
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Token {
    /// Row identifier.
    pub id: i64,

    /// The raw JWT string.
    #[cfg_attr(feature = "sqlx", sqlx(rename = "token"))]
    pub value: String,

    /// Whether the token has been invalidated.
    pub expired: bool,

    /// When the token was obtained.
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Users
// =============================================================================

/// An employee as held by the local terminal server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalUser {
    /// Local server primary key (used in update/delete URLs).
    #[serde(deserialize_with = "lenient::id")]
    pub id: i64,

    /// Employee code; holds the cloud user id as text.
    #[serde(default, deserialize_with = "lenient::string")]
    pub emp_code: String,

    /// Display name; converges to `"{unique_id} {name}"`.
    #[serde(default, deserialize_with = "lenient::string")]
    pub first_name: String,

    /// RFID card number, if any.
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub card_no: Option<String>,

    /// Last modification time as reported by the server.
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub update_time: Option<String>,
}

impl LocalUser {
    /// Creates a local user (mostly useful in tests).
    pub fn new(id: i64, emp_code: impl Into<String>, first_name: impl Into<String>) -> Self {
        LocalUser {
            id,
            emp_code: emp_code.into(),
            first_name: first_name.into(),
            card_no: None,
            update_time: None,
        }
    }

    /// Numeric employee code, or `None` if the code is not a number.
    pub fn emp_code_number(&self) -> Option<i64> {
        parse_identifier("emp_code", &self.emp_code).ok()
    }
}

/// A user as held by the cloud service, the identity source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudUser {
    /// Cloud primary key; mirrored into the local `emp_code`.
    #[serde(deserialize_with = "lenient::id")]
    pub id: i64,

    /// Human-facing identifier (badge or staff number).
    #[serde(default, deserialize_with = "lenient::string")]
    pub unique_id: String,

    /// Full name.
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
}

impl CloudUser {
    /// Creates a cloud user.
    pub fn new(id: i64, unique_id: impl Into<String>, name: impl Into<String>) -> Self {
        CloudUser {
            id,
            unique_id: unique_id.into(),
            name: name.into(),
        }
    }

    /// The `first_name` the local server must hold for this user.
    ///
    /// ## Example
    /// ```rust
    /// use bridge_core::CloudUser;
    ///
    /// assert_eq!(CloudUser::new(1, "A1", "Jane").canonical_first_name(), "A1 Jane");
    /// ```
    pub fn canonical_first_name(&self) -> String {
        format!("{} {}", self.unique_id, self.name)
    }
}

// =============================================================================
// Area / Department References
// =============================================================================

/// An area or department row on the local server.
///
/// The server names the fields `area_code`/`area_name` for areas and
/// `dept_code`/`dept_name` for departments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaDept {
    #[serde(deserialize_with = "lenient::id")]
    pub id: i64,

    #[serde(
        alias = "area_code",
        alias = "dept_code",
        default,
        deserialize_with = "lenient::string"
    )]
    pub code: String,

    #[serde(
        alias = "area_name",
        alias = "dept_name",
        default,
        deserialize_with = "lenient::string"
    )]
    pub name: String,
}

/// Resolved ids of the canonical area and department.
///
/// Required on every employee create/update sent to the local server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceIds {
    pub area_id: i64,
    pub department_id: i64,
}

/// Body of an employee create/update request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmployeePayload {
    pub emp_code: i64,
    pub department: i64,
    pub area: Vec<i64>,
    pub first_name: String,
}

impl EmployeePayload {
    /// Builds the payload for an employee bound to the canonical references.
    pub fn new(emp_code: i64, first_name: impl Into<String>, refs: ReferenceIds) -> Self {
        EmployeePayload {
            emp_code,
            department: refs.department_id,
            area: vec![refs.area_id],
            first_name: first_name.into(),
        }
    }
}

// =============================================================================
// Attendance
// =============================================================================

/// A punch event as listed by the local server's transaction endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePunch {
    /// Transaction id on the local server (dedup key).
    #[serde(deserialize_with = "lenient::id")]
    pub id: i64,

    /// Employee code of the person who punched.
    #[serde(default, deserialize_with = "lenient::string")]
    pub emp_code: String,

    /// `YYYY-MM-DD HH:MM:SS`, local wall-clock time.
    #[serde(default, deserialize_with = "lenient::string")]
    pub punch_time: String,
}

impl RemotePunch {
    /// Creates a punch.
    pub fn new(id: i64, emp_code: impl Into<String>, punch_time: impl Into<String>) -> Self {
        RemotePunch {
            id,
            emp_code: emp_code.into(),
            punch_time: punch_time.into(),
        }
    }

    /// Converts the punch into a row to insert.
    ///
    /// ## Errors
    /// [`CoreError::InvalidPunch`] if the employee code or time cannot be parsed.
    pub fn to_new_attendance(&self) -> CoreResult<NewAttendance> {
        let invalid = |source| CoreError::InvalidPunch {
            attn_id: self.id,
            source,
        };

        let user_id = parse_identifier("emp_code", &self.emp_code).map_err(invalid)?;
        let timestamp = parse_punch_time(&self.punch_time).map_err(invalid)?;

        Ok(NewAttendance {
            user_id,
            timestamp,
            source_attn_id: self.id,
        })
    }
}

/// An attendance row to be inserted if its source id is unseen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttendance {
    pub user_id: i64,
    pub timestamp: NaiveDateTime,
    pub source_attn_id: i64,
}

/// A stored attendance row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct AttendanceRecord {
    /// Row identifier.
    pub id: i64,

    /// Employee code (cloud user id).
    pub user_id: i64,

    /// When the punch happened.
    pub timestamp: NaiveDateTime,

    /// Transaction id on the local server. Unique.
    #[cfg_attr(feature = "sqlx", sqlx(rename = "attn_id"))]
    pub source_attn_id: i64,

    /// Whether the row has been accepted by the cloud.
    pub synced: bool,
}

/// One element of the cloud attendance upload body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceUpload {
    pub user_id: i64,
    pub timestamp: String,
}

impl From<&AttendanceRecord> for AttendanceUpload {
    fn from(record: &AttendanceRecord) -> Self {
        AttendanceUpload {
            user_id: record.user_id,
            timestamp: format_timestamp(&record.timestamp),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
