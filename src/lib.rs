//! Snapshot Rotator Library
//!
//! Tag-driven snapshot backups with per-period retention for EBS volumes and
//! RDS databases.

pub mod adapters;
pub mod config;
pub mod managers;
pub mod utils;

// Re-export commonly used types
pub use adapters::{ResourceAdapter, ResourceKind};
pub use config::{load_config, load_event, resolve_plan, BackupPlan, Config};
pub use managers::coordinator::{AwsProviderFactory, CoordinatorOutcome, ProviderFactory, RunCoordinator, RunSettings};
pub use managers::logging::{init_console_logging, init_logging, LogGuard, LoggingConfig};
pub use managers::notification::NotificationManager;
pub use managers::rotation::{EngineOptions, RetentionEngine, RunMetrics, RunReport};
