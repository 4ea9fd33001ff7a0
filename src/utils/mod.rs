pub mod aws;
pub mod locker;

// Trait-based abstractions for testability
pub mod ec2;
pub mod rds;

// Re-export commonly used types and traits (used by test crate)
pub use aws::{AwsContext, AwsError, TagSet};
#[allow(unused_imports)]
pub use ec2::{Ec2Operations, RealEc2Ops};
#[allow(unused_imports)]
pub use rds::{RdsOperations, RealRdsOps};
pub use locker::RunLock;
