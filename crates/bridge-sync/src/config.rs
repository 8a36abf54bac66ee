//! # Bridge Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     BRIDGE_LOCAL_URL, BRIDGE_LOCAL_USER, BRIDGE_LOCAL_PASS             │
//! │     BRIDGE_CLOUD_URL, BRIDGE_CLOUD_TOKEN, BRIDGE_DB_PATH               │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     --config <path>, or                                                │
//! │     ~/.config/attendance-bridge/bridge.toml (Linux)                    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [local]
//! base_url = "http://127.0.0.1:8081"
//! username = "admin"
//! password = "admin"
//!
//! [cloud]
//! base_url = "https://cloud.example.com"
//! api_token = "secret"
//!
//! [reference]
//! area_code = "BRIDGE"
//! department_code = "BRIDGE"
//!
//! [schedule]
//! heartbeat_secs = 3
//! backfills = [{ every_secs = 1800, lookback_mins = 35 }]
//!
//! [retention]
//! days = 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use bridge_core::validation::validate_reference_code;

use crate::error::{SyncError, SyncResult};

/// File name looked up in the platform config directory.
pub const CONFIG_FILE_NAME: &str = "bridge.toml";

/// Longest history window a backfill or heartbeat may ask for (one year).
pub const MAX_LOOKBACK_MINS: u64 = 366 * 24 * 60;

/// Longest retention period, in days.
pub const MAX_RETENTION_DAYS: u32 = 3650;

// =============================================================================
// Local Server Settings
// =============================================================================

/// Connection settings for the local terminal server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalSettings {
    /// Base URL, e.g. `http://127.0.0.1:8081`.
    #[serde(default = "default_local_url")]
    pub base_url: String,

    /// Username for the JWT endpoint.
    #[serde(default)]
    pub username: String,

    /// Password for the JWT endpoint.
    #[serde(default)]
    pub password: String,

    /// Records requested per page.
    #[serde(default = "default_local_page_size")]
    pub page_size: u32,

    /// Per-request timeout (seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Pause between page requests (milliseconds).
    #[serde(default)]
    pub page_delay_ms: u64,
}

fn default_local_url() -> String {
    "http://127.0.0.1:8081".to_string()
}

fn default_local_page_size() -> u32 {
    500
}

fn default_timeout() -> u64 {
    20
}

impl Default for LocalSettings {
    fn default() -> Self {
        LocalSettings {
            base_url: default_local_url(),
            username: String::new(),
            password: String::new(),
            page_size: default_local_page_size(),
            timeout_secs: default_timeout(),
            page_delay_ms: 0,
        }
    }
}

impl LocalSettings {
    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Pause between page requests.
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

// =============================================================================
// Cloud Settings
// =============================================================================

/// Connection settings for the cloud attendance service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudSettings {
    /// Base URL of the cloud service.
    #[serde(default)]
    pub base_url: String,

    /// API token sent as `?token=`.
    #[serde(default)]
    pub api_token: String,

    /// Users requested per page.
    #[serde(default = "default_cloud_page_size")]
    pub page_size: u32,

    /// Per-request timeout (seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Pause between page requests (milliseconds). The cloud rate-limits.
    #[serde(default = "default_cloud_page_delay")]
    pub page_delay_ms: u64,
}

fn default_cloud_page_size() -> u32 {
    100
}

fn default_cloud_page_delay() -> u64 {
    1000
}

impl Default for CloudSettings {
    fn default() -> Self {
        CloudSettings {
            base_url: String::new(),
            api_token: String::new(),
            page_size: default_cloud_page_size(),
            timeout_secs: default_timeout(),
            page_delay_ms: default_cloud_page_delay(),
        }
    }
}

impl CloudSettings {
    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Pause between page requests.
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

// =============================================================================
// Reference Settings
// =============================================================================

/// The area and department every synced employee is attached to.
///
/// Looked up by code on the local server and created when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSettings {
    #[serde(default = "default_reference_code")]
    pub area_code: String,

    #[serde(default = "default_area_name")]
    pub area_name: String,

    #[serde(default = "default_reference_code")]
    pub department_code: String,

    #[serde(default = "default_department_name")]
    pub department_name: String,
}

fn default_reference_code() -> String {
    "BRIDGE".to_string()
}

fn default_area_name() -> String {
    "Bridge Area".to_string()
}

fn default_department_name() -> String {
    "Bridge Department".to_string()
}

impl Default for ReferenceSettings {
    fn default() -> Self {
        ReferenceSettings {
            area_code: default_reference_code(),
            area_name: default_area_name(),
            department_code: default_reference_code(),
            department_name: default_department_name(),
        }
    }
}

// =============================================================================
// Schedule Settings
// =============================================================================

/// One backfill trigger: every `every_secs`, pull `lookback_mins` of history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillSchedule {
    pub every_secs: u64,
    pub lookback_mins: u64,
}

impl BackfillSchedule {
    pub fn every(&self) -> Duration {
        Duration::from_secs(self.every_secs)
    }

    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.lookback_mins as i64)
    }
}

/// Trigger intervals.
///
/// ## Defaults
/// ```text
/// heartbeat        every 3 s     since latest stored punch (or 6 h back)
/// backfill         every 30 min  35 min back
///                  every 6 h     7 h back
///                  every 12 h    13 h back
///                  every 24 h    10 days back
/// user sync        every 10 min
/// forced upload    every 1 min
/// retention sweep  every 6 h
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    #[serde(default = "default_user_sync_secs")]
    pub user_sync_secs: u64,

    #[serde(default = "default_forced_upload_secs")]
    pub forced_upload_secs: u64,

    #[serde(default = "default_retention_sweep_secs")]
    pub retention_sweep_secs: u64,

    /// Heartbeat lookback when the store holds no punches yet.
    #[serde(default = "default_lookback_mins")]
    pub default_lookback_mins: u64,

    #[serde(default = "default_backfills")]
    pub backfills: Vec<BackfillSchedule>,
}

fn default_heartbeat_secs() -> u64 {
    3
}
fn default_user_sync_secs() -> u64 {
    600
}
fn default_forced_upload_secs() -> u64 {
    60
}
fn default_retention_sweep_secs() -> u64 {
    6 * 60 * 60
}
fn default_lookback_mins() -> u64 {
    6 * 60
}

fn default_backfills() -> Vec<BackfillSchedule> {
    [(1800, 35), (21_600, 420), (43_200, 780), (86_400, 14_400)]
        .into_iter()
        .map(|(every_secs, lookback_mins)| BackfillSchedule {
            every_secs,
            lookback_mins,
        })
        .collect()
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        ScheduleSettings {
            heartbeat_secs: default_heartbeat_secs(),
            user_sync_secs: default_user_sync_secs(),
            forced_upload_secs: default_forced_upload_secs(),
            retention_sweep_secs: default_retention_sweep_secs(),
            default_lookback_mins: default_lookback_mins(),
            backfills: default_backfills(),
        }
    }
}

impl ScheduleSettings {
    pub fn default_lookback(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.default_lookback_mins as i64)
    }
}

// =============================================================================
// Retention / Database Settings
// =============================================================================

/// How long synced attendance is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionSettings {
    #[serde(default = "default_retention_days")]
    pub days: u32,

    /// Also delete the punch on the local server when purging its row.
    #[serde(default)]
    pub purge_remote_transactions: bool,
}

fn default_retention_days() -> u32 {
    10
}

impl Default for RetentionSettings {
    fn default() -> Self {
        RetentionSettings {
            days: default_retention_days(),
            purge_remote_transactions: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("bridge.db")
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub local: LocalSettings,

    #[serde(default)]
    pub cloud: CloudSettings,

    #[serde(default)]
    pub reference: ReferenceSettings,

    #[serde(default)]
    pub schedule: ScheduleSettings,

    #[serde(default)]
    pub retention: RetentionSettings,

    #[serde(default)]
    pub database: DatabaseSettings,
}

impl BridgeConfig {
    /// Loads configuration from file, environment, and defaults, then
    /// validates it.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`config_path`, else the platform config dir)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let explicit = config_path.is_some();
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                config = Self::from_file(&path)?;
            } else if explicit {
                return Err(SyncError::ConfigLoadFailed(format!(
                    "{} does not exist",
                    path.display()
                )));
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML file without env overrides or validation.
    pub fn from_file(path: &Path) -> SyncResult<Self> {
        info!(?path, "Loading bridge config from file");
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Writes the configuration as TOML.
    pub fn save(&self, path: &Path) -> SyncResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Bridge config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        validate_http_url("local.base_url", &self.local.base_url)?;
        validate_http_url("cloud.base_url", &self.cloud.base_url)?;

        if self.local.username.trim().is_empty() {
            return Err(SyncError::InvalidConfig("local.username is required".into()));
        }
        if self.local.password.is_empty() {
            return Err(SyncError::InvalidConfig("local.password is required".into()));
        }
        if self.cloud.api_token.trim().is_empty() {
            return Err(SyncError::InvalidConfig("cloud.api_token is required".into()));
        }

        if self.local.page_size == 0 || self.cloud.page_size == 0 {
            return Err(SyncError::InvalidConfig(
                "page_size must be greater than 0".into(),
            ));
        }
        if self.local.timeout_secs == 0 || self.cloud.timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        for (field, code) in [
            ("reference.area_code", &self.reference.area_code),
            ("reference.department_code", &self.reference.department_code),
        ] {
            validate_reference_code(field, code)
                .map_err(|e| SyncError::InvalidConfig(e.to_string()))?;
        }

        let schedule = &self.schedule;
        let intervals = [
            ("schedule.heartbeat_secs", schedule.heartbeat_secs),
            ("schedule.user_sync_secs", schedule.user_sync_secs),
            ("schedule.forced_upload_secs", schedule.forced_upload_secs),
            ("schedule.retention_sweep_secs", schedule.retention_sweep_secs),
        ];
        for (field, secs) in intervals {
            if secs == 0 {
                return Err(SyncError::InvalidConfig(format!(
                    "{} must be greater than 0",
                    field
                )));
            }
        }
        if schedule.backfills.iter().any(|b| b.every_secs == 0) {
            return Err(SyncError::InvalidConfig(
                "backfill every_secs must be greater than 0".into(),
            ));
        }

        let lookbacks = std::iter::once((
            "schedule.default_lookback_mins",
            schedule.default_lookback_mins,
        ))
        .chain(
            schedule
                .backfills
                .iter()
                .map(|b| ("schedule.backfills.lookback_mins", b.lookback_mins)),
        );
        for (field, mins) in lookbacks {
            if !(1..=MAX_LOOKBACK_MINS).contains(&mins) {
                return Err(SyncError::InvalidConfig(format!(
                    "{} must be between 1 and {}, got {}",
                    field, MAX_LOOKBACK_MINS, mins
                )));
            }
        }

        if !(1..=MAX_RETENTION_DAYS).contains(&self.retention.days) {
            return Err(SyncError::InvalidConfig(format!(
                "retention.days must be between 1 and {}, got {}",
                MAX_RETENTION_DAYS, self.retention.days
            )));
        }

        Ok(())
    }

    /// Applies environment overrides. `lookup` returns the value of a
    /// variable, if set.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("BRIDGE_LOCAL_URL") {
            debug!(url = %url, "Overriding local URL from environment");
            self.local.base_url = url;
        }
        if let Some(user) = lookup("BRIDGE_LOCAL_USER") {
            self.local.username = user;
        }
        if let Some(pass) = lookup("BRIDGE_LOCAL_PASS") {
            self.local.password = pass;
        }
        if let Some(url) = lookup("BRIDGE_CLOUD_URL") {
            debug!(url = %url, "Overriding cloud URL from environment");
            self.cloud.base_url = url;
        }
        if let Some(token) = lookup("BRIDGE_CLOUD_TOKEN") {
            self.cloud.api_token = token;
        }
        if let Some(path) = lookup("BRIDGE_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "attendance", "bridge")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }
}

fn validate_http_url(field: &str, raw: &str) -> SyncResult<()> {
    let url = Url::parse(raw).map_err(|e| SyncError::InvalidUrl(format!("{}: {}", field, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(SyncError::InvalidUrl(format!(
            "{} must use http or https, got {}",
            field, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid() -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.local.username = "admin".into();
        config.local.password = "admin".into();
        config.cloud.base_url = "https://cloud.example.com".into();
        config.cloud.api_token = "secret".into();
        config
    }

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();

        assert_eq!(config.local.page_size, 500);
        assert_eq!(config.cloud.page_size, 100);
        assert_eq!(config.cloud.page_delay(), Duration::from_secs(1));
        assert_eq!(config.local.page_delay(), Duration::ZERO);
        assert_eq!(config.schedule.heartbeat_secs, 3);
        assert_eq!(config.schedule.default_lookback(), chrono::Duration::hours(6));
        assert_eq!(config.schedule.backfills.len(), 4);
        assert_eq!(config.schedule.backfills[3].lookback(), chrono::Duration::days(10));
        assert_eq!(config.retention.days, 10);
        assert!(!config.retention.purge_remote_transactions);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: BridgeConfig = toml::from_str(
            r#"
            [local]
            base_url = "http://10.0.0.5:8081"
            username = "admin"
            password = "pw"

            [cloud]
            base_url = "https://cloud.example.com"
            api_token = "secret"

            [schedule]
            heartbeat_secs = 10
            backfills = [{ every_secs = 60, lookback_mins = 5 }]
            "#,
        )
        .unwrap();

        assert_eq!(config.local.base_url, "http://10.0.0.5:8081");
        assert_eq!(config.local.page_size, 500);
        assert_eq!(config.schedule.heartbeat_secs, 10);
        assert_eq!(config.schedule.user_sync_secs, 600);
        assert_eq!(config.schedule.backfills.len(), 1);
        assert_eq!(config.reference.area_code, "BRIDGE");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("BRIDGE_LOCAL_URL", "http://192.168.1.20:8081"),
            ("BRIDGE_CLOUD_TOKEN", "from-env"),
            ("BRIDGE_DB_PATH", "/var/lib/bridge/bridge.db"),
        ]
        .into_iter()
        .collect();

        let mut config = valid();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.local.base_url, "http://192.168.1.20:8081");
        assert_eq!(config.cloud.api_token, "from-env");
        assert_eq!(config.database.path, PathBuf::from("/var/lib/bridge/bridge.db"));
        assert_eq!(config.local.username, "admin");
    }

    #[test]
    fn test_validation() {
        assert!(valid().validate().is_ok());

        let mut config = valid();
        config.cloud.base_url = "ftp://cloud.example.com".into();
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        let mut config = valid();
        config.cloud.base_url = String::new();
        assert!(config.validate().unwrap_err().is_config_error());

        let mut config = valid();
        config.cloud.api_token = " ".into();
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));

        let mut config = valid();
        config.local.page_size = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.reference.department_code = String::new();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.schedule.heartbeat_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeouts_are_rejected() {
        let mut config = valid();
        config.local.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));

        let mut config = valid();
        config.cloud.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));
    }

    #[test]
    fn test_lookback_and_retention_bounds() {
        let mut config = valid();
        config.schedule.default_lookback_mins = MAX_LOOKBACK_MINS;
        config.schedule.backfills[0].lookback_mins = MAX_LOOKBACK_MINS;
        config.retention.days = MAX_RETENTION_DAYS;
        assert!(config.validate().is_ok());

        let mut config = valid();
        config.schedule.default_lookback_mins = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.schedule.default_lookback_mins = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.schedule.backfills[0].lookback_mins = MAX_LOOKBACK_MINS + 1;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.schedule.backfills[0].lookback_mins = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.retention.days = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.retention.days = u32::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retention.days"));
    }

    #[test]
    fn test_save_and_reload() {
        let path = std::env::temp_dir().join(format!("bridge-config-{}.toml", std::process::id()));

        let mut config = valid();
        config.retention.days = 30;
        config.save(&path).unwrap();

        let reloaded = BridgeConfig::from_file(&path).unwrap();
        assert_eq!(reloaded.retention.days, 30);
        assert_eq!(reloaded.cloud.api_token, "secret");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = BridgeConfig::load(Some(PathBuf::from("/nonexistent/bridge.toml"))).unwrap_err();
        assert!(matches!(err, SyncError::ConfigLoadFailed(_)));
    }
}
