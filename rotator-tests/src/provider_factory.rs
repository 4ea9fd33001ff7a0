//! Provider factory handing out in-memory mocks
//!
//! Mocks share their state through `Arc`, so the clones handed to the
//! coordinator and the handles kept by a test observe the same account.

use anyhow::Result;
use snapshot_rotator::managers::coordinator::ProviderFactory;
use snapshot_rotator::managers::notification::mock::MockPublisher;
use snapshot_rotator::utils::ec2::mock::MockEc2Ops;
use snapshot_rotator::utils::rds::mock::MockRdsOps;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct MockProviderFactory {
    pub ec2: MockEc2Ops,
    pub rds: MockRdsOps,
    pub publisher: MockPublisher,
    pub fail_ec2: bool,
    pub fail_rds: bool,
    clients_built: Arc<AtomicU32>,
}

impl MockProviderFactory {
    pub fn new() -> Self {
        Self {
            ec2: MockEc2Ops::new(),
            ..Default::default()
        }
    }

    pub fn with_ec2(mut self, ec2: MockEc2Ops) -> Self {
        self.ec2 = ec2;
        self
    }

    pub fn with_rds(mut self, rds: MockRdsOps) -> Self {
        self.rds = rds;
        self
    }

    pub fn with_publisher(mut self, publisher: MockPublisher) -> Self {
        self.publisher = publisher;
        self
    }

    /// Make EC2 client construction fail
    pub fn with_failing_ec2(mut self) -> Self {
        self.fail_ec2 = true;
        self
    }

    /// Make RDS client construction fail
    pub fn with_failing_rds(mut self) -> Self {
        self.fail_rds = true;
        self
    }

    /// Number of clients handed out so far
    pub fn clients_built(&self) -> u32 {
        self.clients_built.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.clients_built.fetch_add(1, Ordering::SeqCst);
    }
}

impl ProviderFactory for MockProviderFactory {
    type Ec2 = MockEc2Ops;
    type Rds = MockRdsOps;
    type Publisher = MockPublisher;

    fn ec2(&self, _region: &str) -> Result<MockEc2Ops> {
        self.count();
        if self.fail_ec2 {
            anyhow::bail!("Mock EC2 client unavailable");
        }
        Ok(self.ec2.clone())
    }

    fn rds(&self, _region: &str) -> Result<MockRdsOps> {
        self.count();
        if self.fail_rds {
            anyhow::bail!("Mock RDS client unavailable");
        }
        Ok(self.rds.clone())
    }

    fn publisher(&self, _region: &str) -> Result<MockPublisher> {
        self.count();
        Ok(self.publisher.clone())
    }
}
