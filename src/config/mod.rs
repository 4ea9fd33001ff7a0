//! Configuration module for snapshot-rotator
//!
//! Two inputs feed a run:
//!
//! 1. An optional TOML configuration file with process-wide settings
//!    (logging, share account, creation-failure policy, AWS endpoint).
//! 2. A JSON invocation event from the scheduler naming the period, the
//!    date-suffix pattern, the region, the tag filters and the keep count.
//!
//! The event is resolved against the wall clock into a [`BackupPlan`] before
//! any rotation work starts, so the engine never formats dates itself.
//!
//! ## Example Usage
//!
//! ```no_run
//! use snapshot_rotator::config;
//!
//! let payload = config::load_event(Some(std::path::Path::new("event.json")))?;
//! let event = config::parse_event(&payload)?;
//! let plan = config::resolve_plan(&event, chrono::Utc::now())?;
//!
//! if let Some(filter) = &plan.volume_filter {
//!     println!("Volumes tagged {}", filter);
//! }
//! # Ok::<(), config::ConfigError>(())
//! ```

mod loader;
mod types;

pub use loader::{
    format_date_suffix, load_config, load_event, parse_event, resolve_plan,
    resolve_share_account, ConfigError, Result, EXT_ACCOUNT_ENV,
};
pub use types::*;

/// Expand tilde (~) in path
pub fn expand_tilde(path: &std::path::Path) -> std::path::PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}
