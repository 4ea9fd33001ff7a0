use super::types::*;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::warn;

/// Environment variable naming the share-target account
pub const EXT_ACCOUNT_ENV: &str = "EXT_ACCOUNT";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to parse event: {0}")]
    EventParseError(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid date format '{0}'")]
    InvalidDateFormat(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate the configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.global.log_max_files == 0 {
        return Err(ConfigError::ValidationError(
            "log_max_files must be at least 1".to_string(),
        ));
    }

    if let Some(ref endpoint) = config.global.endpoint_url {
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(ConfigError::ValidationError(format!(
                "endpoint_url must start with http:// or https://: {}",
                endpoint
            )));
        }
    }

    if let Some(ref account) = config.global.share_account {
        if !account.is_empty() && !account.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::ValidationError(format!(
                "share_account must be a numeric account id: {}",
                account
            )));
        }
    }

    Ok(())
}

/// Read the raw event payload from a file, or from stdin when `path` is
/// `None` or `-`
pub fn load_event(path: Option<&Path>) -> Result<Value> {
    let contents = match path {
        Some(p) if p != Path::new("-") => fs::read_to_string(p)?,
        _ => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let value: Value = serde_json::from_str(&contents)?;
    if !value.is_object() {
        return Err(ConfigError::ValidationError(
            "Event must be a JSON object".to_string(),
        ));
    }

    Ok(value)
}

/// Deserialize the typed event out of the raw payload
pub fn parse_event(payload: &Value) -> Result<BackupEvent> {
    Ok(BackupEvent::deserialize(payload)?)
}

/// Validate an event and resolve it against the wall clock.
///
/// An event without a usable tag pair resolves to a no-op plan and skips
/// validation entirely; its `date_suffix` is empty.
pub fn resolve_plan(event: &BackupEvent, now: DateTime<Utc>) -> Result<BackupPlan> {
    let volume_filter = tag_filter(
        "ec2",
        event.ec2_tag_name.as_deref(),
        event.ec2_tag_value.as_deref(),
    );
    let database_filter = tag_filter(
        "rds",
        event.rds_tag_name.as_deref(),
        event.rds_tag_value.as_deref(),
    );

    let mut plan = BackupPlan {
        period: event.period_label.clone(),
        date_suffix: String::new(),
        region: event.region_name.clone(),
        keep_count: event.keep_count,
        volume_filter,
        database_filter,
        success_topic: non_empty(event.arn.as_deref()),
        error_topic: non_empty(event.error_arn.as_deref()),
    };

    if plan.is_noop() {
        return Ok(plan);
    }

    if event.period_label.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "period_label must not be empty".to_string(),
        ));
    }

    if event.region_name.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "region_name must not be empty".to_string(),
        ));
    }

    plan.date_suffix = format_date_suffix(&event.period_format, now)?;
    Ok(plan)
}

/// Format `now` with a strftime pattern, rejecting malformed patterns up front
pub fn format_date_suffix(format: &str, now: DateTime<Utc>) -> Result<String> {
    if format.is_empty() || StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(ConfigError::InvalidDateFormat(format.to_string()));
    }

    Ok(now.format(format).to_string())
}

/// Share-target account: config first, then the EXT_ACCOUNT environment variable
pub fn resolve_share_account(global: &GlobalConfig) -> Option<String> {
    non_empty(global.share_account.as_deref())
        .or_else(|| non_empty(std::env::var(EXT_ACCOUNT_ENV).ok().as_deref()))
}

/// Both halves of a tag pair are required; a lone half disables the adapter
fn tag_filter(prefix: &str, name: Option<&str>, value: Option<&str>) -> Option<TagFilter> {
    match (non_empty(name), non_empty(value)) {
        (Some(name), Some(value)) => Some(TagFilter { name, value }),
        (None, None) => None,
        _ => {
            warn!(
                "Ignoring incomplete {}_tag_name/{}_tag_value pair; both are required",
                prefix, prefix
            );
            None
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}
