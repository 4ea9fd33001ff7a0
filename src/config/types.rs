use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// Global configuration settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Logging configuration
    #[serde(default = "default_log_directory")]
    pub log_directory: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_max_files")]
    pub log_max_files: u32,

    /// Account every new snapshot is shared with (falls back to EXT_ACCOUNT)
    #[serde(default)]
    pub share_account: Option<String>,

    /// What a failed snapshot creation does to the resource's outcome
    #[serde(default)]
    pub creation_failure: CreationFailurePolicy,

    /// Custom AWS endpoint (LocalStack and friends)
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// Where run lock files are created
    #[serde(default = "default_lock_directory")]
    pub lock_directory: PathBuf,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_directory: default_log_directory(),
            log_level: default_log_level(),
            log_max_files: default_log_max_files(),
            share_account: None,
            creation_failure: CreationFailurePolicy::default(),
            endpoint_url: None,
            lock_directory: default_lock_directory(),
        }
    }
}

/// Handling of a snapshot that could not be created.
///
/// `Log` records the failure in the run transcript and still applies
/// retention to the resource without counting an error. `Error` escalates it
/// to a resource-level failure.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CreationFailurePolicy {
    #[default]
    Log,
    Error,
}

/// Notification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// Master switch for SNS publishing (topics come from the event)
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
        }
    }
}

/// Invocation event as delivered by the scheduler
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct BackupEvent {
    /// Rotation schedule identifier, e.g. "day"
    pub period_label: String,
    /// strftime pattern used to build the date suffix
    pub period_format: String,
    pub region_name: String,

    #[serde(default)]
    pub ec2_tag_name: Option<String>,
    #[serde(default)]
    pub ec2_tag_value: Option<String>,

    #[serde(default)]
    pub rds_tag_name: Option<String>,
    #[serde(default)]
    pub rds_tag_value: Option<String>,

    pub keep_count: u32,

    /// Topic for success summaries
    #[serde(default)]
    pub arn: Option<String>,
    /// Topic for error summaries
    #[serde(default)]
    pub error_arn: Option<String>,
}

/// Tag key/value pair selecting backupable resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFilter {
    pub name: String,
    pub value: String,
}

impl std::fmt::Display for TagFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{ \"tag:{}\": \"{}\" }}", self.name, self.value)
    }
}

/// Resolved invocation: everything the coordinator needs, wall clock applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPlan {
    pub period: String,
    pub date_suffix: String,
    pub region: String,
    pub keep_count: u32,
    pub volume_filter: Option<TagFilter>,
    pub database_filter: Option<TagFilter>,
    pub success_topic: Option<String>,
    pub error_topic: Option<String>,
}

impl BackupPlan {
    /// True when neither resource type has a usable tag filter
    pub fn is_noop(&self) -> bool {
        self.volume_filter.is_none() && self.database_filter.is_none()
    }

    /// Build the engine input for one tag filter
    pub fn run_for(&self, tag_filter: &TagFilter) -> BackupRun {
        BackupRun {
            period: self.period.clone(),
            tag_filter: tag_filter.clone(),
            date_suffix: self.date_suffix.clone(),
            keep_count: self.keep_count,
        }
    }
}

/// One rotation pass for one resource type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRun {
    pub period: String,
    pub tag_filter: TagFilter,
    pub date_suffix: String,
    /// Minimum number of same-period snapshots kept per resource
    pub keep_count: u32,
}

// Default value functions

fn default_log_directory() -> PathBuf { PathBuf::from("~/logs") }
fn default_log_level() -> String { "info".to_string() }
fn default_log_max_files() -> u32 { 10 }
fn default_enabled() -> bool { true }
fn default_lock_directory() -> PathBuf { std::env::temp_dir() }
