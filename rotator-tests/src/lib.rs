//! Test utilities for snapshot-rotator
//!
//! Shared fixtures, builders and mock wiring for the `unit` and `commands`
//! test targets.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use test_utils::{EventBuilder, MockProviderFactory, MockEc2Ops};
//!
//! #[test]
//! fn my_test() {
//!     let ec2 = MockEc2Ops::new().with_volume("vol-1", &[("MakeSnapshot", "True")]);
//!     let factory = MockProviderFactory::new().with_ec2(ec2);
//!     let event = EventBuilder::daily().ec2_tag("MakeSnapshot", "True").build();
//!     // ... test code
//! }
//! ```

pub mod config_builder;
pub mod event_builder;
pub mod fixtures;
pub mod provider_factory;
pub mod test_context;

// Re-export commonly used items
pub use config_builder::ConfigBuilder;
pub use event_builder::EventBuilder;
pub use fixtures::*;
pub use provider_factory::MockProviderFactory;
pub use test_context::{OptionAssertions, ResultAssertions, TestContext};

// Re-export types from the main crate for convenience
pub use snapshot_rotator::config::{
    BackupEvent, BackupPlan, BackupRun, Config, CreationFailurePolicy, GlobalConfig,
    NotificationConfig, TagFilter,
};
pub use snapshot_rotator::managers::rotation::{EngineOptions, RetentionEngine, RunMetrics, RunReport};

// Re-export mock implementations from the main crate
pub use snapshot_rotator::managers::notification::mock::{MockPublisher, Published};
pub use snapshot_rotator::utils::ec2::mock::{Ec2Call, MockEc2Ops};
pub use snapshot_rotator::utils::rds::mock::{MockRdsOps, RdsCall};

/// Common test result type
pub type TestResult<T = ()> = anyhow::Result<T>;
