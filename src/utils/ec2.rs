//! EC2 operations abstraction for testability
//!
//! The volume adapter only talks to EC2 through [`Ec2Operations`], so its
//! enumeration, tagging and sharing logic can be exercised against the
//! in-memory [`mock::MockEc2Ops`].

use super::aws::{to_utc, AwsContext, AwsError, TagSet};
use crate::config::TagFilter;
use anyhow::Result;
use aws_sdk_ec2::types::{Filter, OperationType, SnapshotAttributeName, Tag};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Block-storage volume eligible for snapshotting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub volume_id: String,
}

/// EBS snapshot as reported by EC2
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ec2Snapshot {
    pub snapshot_id: String,
    pub volume_id: String,
    pub description: String,
    pub start_time: Option<DateTime<Utc>>,
}

/// Abstraction for EC2 operations, enabling mocking in tests
pub trait Ec2Operations: Send + Sync {
    /// Volumes carrying `tag:<name> = <value>`
    fn describe_volumes(&self, filter: &TagFilter) -> Result<Vec<Volume>>;

    /// All tags on a resource, reserved ones included
    fn describe_tags(&self, resource_id: &str) -> Result<Vec<(String, String)>>;

    /// Start a snapshot of a volume
    fn create_snapshot(&self, volume_id: &str, description: &str) -> Result<Ec2Snapshot>;

    /// Apply tags to a resource
    fn create_tags(&self, resource_id: &str, tags: &TagSet) -> Result<()>;

    /// Grant an account create-volume permission on a snapshot
    fn share_snapshot(&self, snapshot_id: &str, account: &str) -> Result<()>;

    /// Snapshots owned by this account that were taken from a volume
    fn describe_snapshots(&self, volume_id: &str) -> Result<Vec<Ec2Snapshot>>;

    fn delete_snapshot(&self, snapshot_id: &str) -> Result<()>;
}

/// Implementation backed by the AWS SDK
#[derive(Debug, Clone)]
pub struct RealEc2Ops {
    client: aws_sdk_ec2::Client,
    context: Arc<AwsContext>,
}

impl RealEc2Ops {
    pub fn new(context: Arc<AwsContext>) -> Self {
        let client = aws_sdk_ec2::Client::new(context.sdk_config());
        Self { client, context }
    }
}

fn snapshot_from_sdk(snapshot: &aws_sdk_ec2::types::Snapshot) -> Option<Ec2Snapshot> {
    Some(Ec2Snapshot {
        snapshot_id: snapshot.snapshot_id()?.to_string(),
        volume_id: snapshot.volume_id().unwrap_or_default().to_string(),
        description: snapshot.description().unwrap_or_default().to_string(),
        start_time: snapshot.start_time().and_then(to_utc),
    })
}

impl Ec2Operations for RealEc2Ops {
    fn describe_volumes(&self, filter: &TagFilter) -> Result<Vec<Volume>> {
        let request = self.client.describe_volumes().filters(
            Filter::builder()
                .name(format!("tag:{}", filter.name))
                .values(&filter.value)
                .build(),
        );

        let volumes = self.context.block_on(async {
            let mut volumes = Vec::new();
            let mut pages = request.into_paginator().send();
            while let Some(page) = pages.next().await {
                let page = page.map_err(|e| AwsError::sdk("DescribeVolumes", e))?;
                volumes.extend(page.volumes().iter().filter_map(|v| {
                    v.volume_id().map(|id| Volume {
                        volume_id: id.to_string(),
                    })
                }));
            }
            Ok::<_, AwsError>(volumes)
        })?;

        Ok(volumes)
    }

    fn describe_tags(&self, resource_id: &str) -> Result<Vec<(String, String)>> {
        let request = self.client.describe_tags().filters(
            Filter::builder()
                .name("resource-id")
                .values(resource_id)
                .build(),
        );

        let tags = self.context.block_on(async {
            let mut tags = Vec::new();
            let mut pages = request.into_paginator().send();
            while let Some(page) = pages.next().await {
                let page = page.map_err(|e| AwsError::sdk("DescribeTags", e))?;
                tags.extend(page.tags().iter().filter_map(|t| {
                    Some((t.key()?.to_string(), t.value().unwrap_or_default().to_string()))
                }));
            }
            Ok::<_, AwsError>(tags)
        })?;

        Ok(tags)
    }

    fn create_snapshot(&self, volume_id: &str, description: &str) -> Result<Ec2Snapshot> {
        let output = self
            .context
            .block_on(
                self.client
                    .create_snapshot()
                    .volume_id(volume_id)
                    .description(description)
                    .send(),
            )
            .map_err(|e| AwsError::sdk("CreateSnapshot", e))?;

        let snapshot_id = output.snapshot_id().ok_or(AwsError::MissingField {
            operation: "CreateSnapshot",
            field: "SnapshotId",
        })?;

        debug!("Created snapshot {} of {}", snapshot_id, volume_id);

        Ok(Ec2Snapshot {
            snapshot_id: snapshot_id.to_string(),
            volume_id: volume_id.to_string(),
            description: output.description().unwrap_or(description).to_string(),
            start_time: output.start_time().and_then(to_utc),
        })
    }

    fn create_tags(&self, resource_id: &str, tags: &TagSet) -> Result<()> {
        let tags: Vec<Tag> = tags
            .iter()
            .map(|(key, value)| Tag::builder().key(key).value(value).build())
            .collect();

        self.context
            .block_on(
                self.client
                    .create_tags()
                    .resources(resource_id)
                    .set_tags(Some(tags))
                    .send(),
            )
            .map_err(|e| AwsError::sdk("CreateTags", e))?;

        Ok(())
    }

    fn share_snapshot(&self, snapshot_id: &str, account: &str) -> Result<()> {
        self.context
            .block_on(
                self.client
                    .modify_snapshot_attribute()
                    .snapshot_id(snapshot_id)
                    .attribute(SnapshotAttributeName::CreateVolumePermission)
                    .operation_type(OperationType::Add)
                    .user_ids(account)
                    .send(),
            )
            .map_err(|e| AwsError::sdk("ModifySnapshotAttribute", e))?;

        Ok(())
    }

    fn describe_snapshots(&self, volume_id: &str) -> Result<Vec<Ec2Snapshot>> {
        let request = self
            .client
            .describe_snapshots()
            .owner_ids("self")
            .filters(Filter::builder().name("volume-id").values(volume_id).build());

        let snapshots = self.context.block_on(async {
            let mut snapshots = Vec::new();
            let mut pages = request.into_paginator().send();
            while let Some(page) = pages.next().await {
                let page = page.map_err(|e| AwsError::sdk("DescribeSnapshots", e))?;
                snapshots.extend(page.snapshots().iter().filter_map(snapshot_from_sdk));
            }
            Ok::<_, AwsError>(snapshots)
        })?;

        Ok(snapshots)
    }

    fn delete_snapshot(&self, snapshot_id: &str) -> Result<()> {
        self.context
            .block_on(self.client.delete_snapshot().snapshot_id(snapshot_id).send())
            .map_err(|e| AwsError::sdk("DeleteSnapshot", e))?;

        Ok(())
    }
}

/// Mock implementation for testing
/// Available for use in external test crates
#[allow(dead_code)]
pub mod mock {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// Recorded operation call
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum Ec2Call {
        DescribeVolumes { tag_name: String, tag_value: String },
        DescribeTags { resource_id: String },
        CreateSnapshot { volume_id: String, description: String },
        CreateTags { resource_id: String, tags: TagSet },
        ShareSnapshot { snapshot_id: String, account: String },
        DescribeSnapshots { volume_id: String },
        DeleteSnapshot { snapshot_id: String },
    }

    /// In-memory EC2 account
    #[derive(Clone, Default)]
    pub struct MockEc2Ops {
        /// Recorded operation calls
        pub calls: Arc<Mutex<Vec<Ec2Call>>>,
        /// Volumes and the raw tags on each
        pub volumes: Arc<Mutex<Vec<(Volume, Vec<(String, String)>)>>>,
        /// Existing snapshots, in listing order
        pub snapshots: Arc<Mutex<Vec<Ec2Snapshot>>>,
        /// Tags applied to snapshots
        pub snapshot_tags: Arc<Mutex<HashMap<String, TagSet>>>,
        /// Accounts each snapshot was shared with
        pub shares: Arc<Mutex<HashMap<String, Vec<String>>>>,
        /// Volume ids whose snapshot listing fails
        pub failing_list: Arc<Mutex<HashSet<String>>>,
        /// Volume ids whose snapshot creation fails
        pub failing_create: Arc<Mutex<HashSet<String>>>,
        /// Whether tagging fails
        pub should_fail_tags: Arc<Mutex<bool>>,
        /// Whether volume enumeration fails
        pub should_fail_describe_volumes: Arc<Mutex<bool>>,
        /// Start time handed to the next created snapshot
        pub clock: Arc<Mutex<DateTime<Utc>>>,
        next_id: Arc<Mutex<u32>>,
    }

    impl MockEc2Ops {
        pub fn new() -> Self {
            let mock = Self::default();
            *mock.clock.lock().unwrap() = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
            mock
        }

        /// Add a volume with raw tags
        pub fn with_volume(self, volume_id: &str, tags: &[(&str, &str)]) -> Self {
            self.volumes.lock().unwrap().push((
                Volume {
                    volume_id: volume_id.to_string(),
                },
                tags.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ));
            self
        }

        /// Add an existing snapshot
        pub fn with_snapshot(
            self,
            volume_id: &str,
            snapshot_id: &str,
            description: &str,
            start_time: Option<DateTime<Utc>>,
        ) -> Self {
            self.snapshots.lock().unwrap().push(Ec2Snapshot {
                snapshot_id: snapshot_id.to_string(),
                volume_id: volume_id.to_string(),
                description: description.to_string(),
                start_time,
            });
            self
        }

        /// Configure snapshot listing to fail for one volume
        pub fn with_failing_list(self, volume_id: &str) -> Self {
            self.failing_list.lock().unwrap().insert(volume_id.to_string());
            self
        }

        /// Configure snapshot creation to fail for one volume
        pub fn with_failing_create(self, volume_id: &str) -> Self {
            self.failing_create.lock().unwrap().insert(volume_id.to_string());
            self
        }

        /// Configure tagging to fail
        pub fn with_failing_tags(self) -> Self {
            *self.should_fail_tags.lock().unwrap() = true;
            self
        }

        /// Configure volume enumeration to fail
        pub fn with_failing_describe_volumes(self) -> Self {
            *self.should_fail_describe_volumes.lock().unwrap() = true;
            self
        }

        /// Set the start time of the next created snapshot
        pub fn with_clock(self, now: DateTime<Utc>) -> Self {
            *self.clock.lock().unwrap() = now;
            self
        }

        fn record_call(&self, call: Ec2Call) {
            self.calls.lock().unwrap().push(call);
        }

        pub fn recorded_calls(&self) -> Vec<Ec2Call> {
            self.calls.lock().unwrap().clone()
        }

        /// Snapshot ids still present for a volume, in listing order
        pub fn snapshot_ids(&self, volume_id: &str) -> Vec<String> {
            self.snapshots
                .lock()
                .unwrap()
                .iter()
                .filter(|s| s.volume_id == volume_id)
                .map(|s| s.snapshot_id.clone())
                .collect()
        }

        /// Ids passed to delete_snapshot, in call order
        pub fn deleted_ids(&self) -> Vec<String> {
            self.recorded_calls()
                .into_iter()
                .filter_map(|call| match call {
                    Ec2Call::DeleteSnapshot { snapshot_id } => Some(snapshot_id),
                    _ => None,
                })
                .collect()
        }

        pub fn tags_for(&self, snapshot_id: &str) -> Option<TagSet> {
            self.snapshot_tags.lock().unwrap().get(snapshot_id).cloned()
        }

        pub fn shares_for(&self, snapshot_id: &str) -> Vec<String> {
            self.shares
                .lock()
                .unwrap()
                .get(snapshot_id)
                .cloned()
                .unwrap_or_default()
        }
    }

    impl Ec2Operations for MockEc2Ops {
        fn describe_volumes(&self, filter: &TagFilter) -> Result<Vec<Volume>> {
            self.record_call(Ec2Call::DescribeVolumes {
                tag_name: filter.name.clone(),
                tag_value: filter.value.clone(),
            });
            if *self.should_fail_describe_volumes.lock().unwrap() {
                anyhow::bail!("Mock DescribeVolumes failure");
            }
            Ok(self
                .volumes
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, tags)| {
                    tags.iter()
                        .any(|(k, v)| *k == filter.name && *v == filter.value)
                })
                .map(|(volume, _)| volume.clone())
                .collect())
        }

        fn describe_tags(&self, resource_id: &str) -> Result<Vec<(String, String)>> {
            self.record_call(Ec2Call::DescribeTags {
                resource_id: resource_id.to_string(),
            });
            Ok(self
                .volumes
                .lock()
                .unwrap()
                .iter()
                .find(|(volume, _)| volume.volume_id == resource_id)
                .map(|(_, tags)| tags.clone())
                .unwrap_or_default())
        }

        fn create_snapshot(&self, volume_id: &str, description: &str) -> Result<Ec2Snapshot> {
            self.record_call(Ec2Call::CreateSnapshot {
                volume_id: volume_id.to_string(),
                description: description.to_string(),
            });
            if self.failing_create.lock().unwrap().contains(volume_id) {
                anyhow::bail!("Mock CreateSnapshot failure for {}", volume_id);
            }

            let snapshot_id = {
                let mut next_id = self.next_id.lock().unwrap();
                *next_id += 1;
                format!("snap-new{:04}", *next_id)
            };
            let start_time = {
                let mut clock = self.clock.lock().unwrap();
                let now = *clock;
                *clock = now + Duration::minutes(1);
                now
            };

            let snapshot = Ec2Snapshot {
                snapshot_id,
                volume_id: volume_id.to_string(),
                description: description.to_string(),
                start_time: Some(start_time),
            };
            self.snapshots.lock().unwrap().push(snapshot.clone());
            Ok(snapshot)
        }

        fn create_tags(&self, resource_id: &str, tags: &TagSet) -> Result<()> {
            self.record_call(Ec2Call::CreateTags {
                resource_id: resource_id.to_string(),
                tags: tags.clone(),
            });
            if *self.should_fail_tags.lock().unwrap() {
                anyhow::bail!("Mock CreateTags failure");
            }
            self.snapshot_tags
                .lock()
                .unwrap()
                .entry(resource_id.to_string())
                .or_default()
                .extend(tags.clone());
            Ok(())
        }

        fn share_snapshot(&self, snapshot_id: &str, account: &str) -> Result<()> {
            self.record_call(Ec2Call::ShareSnapshot {
                snapshot_id: snapshot_id.to_string(),
                account: account.to_string(),
            });
            self.shares
                .lock()
                .unwrap()
                .entry(snapshot_id.to_string())
                .or_default()
                .push(account.to_string());
            Ok(())
        }

        fn describe_snapshots(&self, volume_id: &str) -> Result<Vec<Ec2Snapshot>> {
            self.record_call(Ec2Call::DescribeSnapshots {
                volume_id: volume_id.to_string(),
            });
            if self.failing_list.lock().unwrap().contains(volume_id) {
                anyhow::bail!("Mock DescribeSnapshots failure for {}", volume_id);
            }
            Ok(self
                .snapshots
                .lock()
                .unwrap()
                .iter()
                .filter(|s| s.volume_id == volume_id)
                .cloned()
                .collect())
        }

        fn delete_snapshot(&self, snapshot_id: &str) -> Result<()> {
            self.record_call(Ec2Call::DeleteSnapshot {
                snapshot_id: snapshot_id.to_string(),
            });
            self.snapshots
                .lock()
                .unwrap()
                .retain(|s| s.snapshot_id != snapshot_id);
            Ok(())
        }
    }
}
