//! RDS operations abstraction for testability

use super::aws::{to_utc, AwsContext, AwsError, TagSet};
use anyhow::Result;
use aws_sdk_rds::types::Tag;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Snapshot attribute granting restore permission to other accounts
const RESTORE_ATTRIBUTE: &str = "restore";

/// Only snapshots taken on request take part in rotation
const MANUAL_SNAPSHOT_TYPE: &str = "manual";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbCluster {
    pub identifier: String,
    pub arn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbInstance {
    pub identifier: String,
    pub arn: Option<String>,
    /// Set when the instance is a member of a cluster
    pub cluster_identifier: Option<String>,
}

/// DB or DB cluster snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdsSnapshot {
    pub identifier: String,
    /// Instance or cluster the snapshot was taken from
    pub source_identifier: String,
    pub create_time: Option<DateTime<Utc>>,
}

/// Abstraction for RDS operations, enabling mocking in tests
pub trait RdsOperations: Send + Sync {
    /// Region the client is bound to
    fn region(&self) -> &str;

    fn describe_db_clusters(&self) -> Result<Vec<DbCluster>>;

    fn describe_db_instances(&self) -> Result<Vec<DbInstance>>;

    /// All tags on a resource, reserved ones included
    fn list_tags_for_resource(&self, arn: &str) -> Result<Vec<(String, String)>>;

    /// Owner account of the first DB security group, if there is one
    fn describe_security_group_owner(&self) -> Result<Option<String>>;

    fn create_db_cluster_snapshot(
        &self,
        cluster_id: &str,
        snapshot_id: &str,
        tags: &TagSet,
    ) -> Result<RdsSnapshot>;

    fn create_db_snapshot(
        &self,
        instance_id: &str,
        snapshot_id: &str,
        tags: &TagSet,
    ) -> Result<RdsSnapshot>;

    fn share_db_cluster_snapshot(&self, snapshot_id: &str, account: &str) -> Result<()>;

    fn share_db_snapshot(&self, snapshot_id: &str, account: &str) -> Result<()>;

    /// Manual snapshots of a cluster
    fn describe_db_cluster_snapshots(&self, cluster_id: &str) -> Result<Vec<RdsSnapshot>>;

    /// Manual snapshots of an instance
    fn describe_db_snapshots(&self, instance_id: &str) -> Result<Vec<RdsSnapshot>>;

    fn delete_db_cluster_snapshot(&self, snapshot_id: &str) -> Result<()>;

    fn delete_db_snapshot(&self, snapshot_id: &str) -> Result<()>;
}

/// Implementation backed by the AWS SDK
#[derive(Debug, Clone)]
pub struct RealRdsOps {
    client: aws_sdk_rds::Client,
    context: Arc<AwsContext>,
}

impl RealRdsOps {
    pub fn new(context: Arc<AwsContext>) -> Self {
        let client = aws_sdk_rds::Client::new(context.sdk_config());
        Self { client, context }
    }
}

fn sdk_tags(tags: &TagSet) -> Vec<Tag> {
    tags.iter()
        .map(|(key, value)| Tag::builder().key(key).value(value).build())
        .collect()
}

fn from_db_snapshot(snapshot: &aws_sdk_rds::types::DbSnapshot) -> Option<RdsSnapshot> {
    Some(RdsSnapshot {
        identifier: snapshot.db_snapshot_identifier()?.to_string(),
        source_identifier: snapshot
            .db_instance_identifier()
            .unwrap_or_default()
            .to_string(),
        create_time: snapshot.snapshot_create_time().and_then(to_utc),
    })
}

fn from_cluster_snapshot(snapshot: &aws_sdk_rds::types::DbClusterSnapshot) -> Option<RdsSnapshot> {
    Some(RdsSnapshot {
        identifier: snapshot.db_cluster_snapshot_identifier()?.to_string(),
        source_identifier: snapshot
            .db_cluster_identifier()
            .unwrap_or_default()
            .to_string(),
        create_time: snapshot.snapshot_create_time().and_then(to_utc),
    })
}

impl RdsOperations for RealRdsOps {
    fn region(&self) -> &str {
        self.context.region()
    }

    fn describe_db_clusters(&self) -> Result<Vec<DbCluster>> {
        let request = self.client.describe_db_clusters();

        let clusters = self.context.block_on(async {
            let mut clusters = Vec::new();
            let mut pages = request.into_paginator().send();
            while let Some(page) = pages.next().await {
                let page = page.map_err(|e| AwsError::sdk("DescribeDBClusters", e))?;
                clusters.extend(page.db_clusters().iter().filter_map(|c| {
                    Some(DbCluster {
                        identifier: c.db_cluster_identifier()?.to_string(),
                        arn: c.db_cluster_arn().map(String::from),
                    })
                }));
            }
            Ok::<_, AwsError>(clusters)
        })?;

        Ok(clusters)
    }

    fn describe_db_instances(&self) -> Result<Vec<DbInstance>> {
        let request = self.client.describe_db_instances();

        let instances = self.context.block_on(async {
            let mut instances = Vec::new();
            let mut pages = request.into_paginator().send();
            while let Some(page) = pages.next().await {
                let page = page.map_err(|e| AwsError::sdk("DescribeDBInstances", e))?;
                instances.extend(page.db_instances().iter().filter_map(|i| {
                    Some(DbInstance {
                        identifier: i.db_instance_identifier()?.to_string(),
                        arn: i.db_instance_arn().map(String::from),
                        cluster_identifier: i.db_cluster_identifier().map(String::from),
                    })
                }));
            }
            Ok::<_, AwsError>(instances)
        })?;

        Ok(instances)
    }

    fn list_tags_for_resource(&self, arn: &str) -> Result<Vec<(String, String)>> {
        let output = self
            .context
            .block_on(self.client.list_tags_for_resource().resource_name(arn).send())
            .map_err(|e| AwsError::sdk("ListTagsForResource", e))?;

        Ok(output
            .tag_list()
            .iter()
            .filter_map(|t| Some((t.key()?.to_string(), t.value().unwrap_or_default().to_string())))
            .collect())
    }

    fn describe_security_group_owner(&self) -> Result<Option<String>> {
        let output = self
            .context
            .block_on(self.client.describe_db_security_groups().send())
            .map_err(|e| AwsError::sdk("DescribeDBSecurityGroups", e))?;

        Ok(output
            .db_security_groups()
            .first()
            .and_then(|g| g.owner_id())
            .map(String::from))
    }

    fn create_db_cluster_snapshot(
        &self,
        cluster_id: &str,
        snapshot_id: &str,
        tags: &TagSet,
    ) -> Result<RdsSnapshot> {
        let output = self
            .context
            .block_on(
                self.client
                    .create_db_cluster_snapshot()
                    .db_cluster_identifier(cluster_id)
                    .db_cluster_snapshot_identifier(snapshot_id)
                    .set_tags(Some(sdk_tags(tags)))
                    .send(),
            )
            .map_err(|e| AwsError::sdk("CreateDBClusterSnapshot", e))?;

        debug!("Created cluster snapshot {} of {}", snapshot_id, cluster_id);

        let snapshot = output
            .db_cluster_snapshot()
            .and_then(from_cluster_snapshot)
            .ok_or(AwsError::MissingField {
                operation: "CreateDBClusterSnapshot",
                field: "DBClusterSnapshot",
            })?;

        Ok(snapshot)
    }

    fn create_db_snapshot(
        &self,
        instance_id: &str,
        snapshot_id: &str,
        tags: &TagSet,
    ) -> Result<RdsSnapshot> {
        let output = self
            .context
            .block_on(
                self.client
                    .create_db_snapshot()
                    .db_instance_identifier(instance_id)
                    .db_snapshot_identifier(snapshot_id)
                    .set_tags(Some(sdk_tags(tags)))
                    .send(),
            )
            .map_err(|e| AwsError::sdk("CreateDBSnapshot", e))?;

        debug!("Created DB snapshot {} of {}", snapshot_id, instance_id);

        let snapshot = output
            .db_snapshot()
            .and_then(from_db_snapshot)
            .ok_or(AwsError::MissingField {
                operation: "CreateDBSnapshot",
                field: "DBSnapshot",
            })?;

        Ok(snapshot)
    }

    fn share_db_cluster_snapshot(&self, snapshot_id: &str, account: &str) -> Result<()> {
        self.context
            .block_on(
                self.client
                    .modify_db_cluster_snapshot_attribute()
                    .db_cluster_snapshot_identifier(snapshot_id)
                    .attribute_name(RESTORE_ATTRIBUTE)
                    .values_to_add(account)
                    .send(),
            )
            .map_err(|e| AwsError::sdk("ModifyDBClusterSnapshotAttribute", e))?;

        Ok(())
    }

    fn share_db_snapshot(&self, snapshot_id: &str, account: &str) -> Result<()> {
        self.context
            .block_on(
                self.client
                    .modify_db_snapshot_attribute()
                    .db_snapshot_identifier(snapshot_id)
                    .attribute_name(RESTORE_ATTRIBUTE)
                    .values_to_add(account)
                    .send(),
            )
            .map_err(|e| AwsError::sdk("ModifyDBSnapshotAttribute", e))?;

        Ok(())
    }

    fn describe_db_cluster_snapshots(&self, cluster_id: &str) -> Result<Vec<RdsSnapshot>> {
        let request = self
            .client
            .describe_db_cluster_snapshots()
            .db_cluster_identifier(cluster_id)
            .snapshot_type(MANUAL_SNAPSHOT_TYPE);

        let snapshots = self.context.block_on(async {
            let mut snapshots = Vec::new();
            let mut pages = request.into_paginator().send();
            while let Some(page) = pages.next().await {
                let page = page.map_err(|e| AwsError::sdk("DescribeDBClusterSnapshots", e))?;
                snapshots.extend(
                    page.db_cluster_snapshots()
                        .iter()
                        .filter_map(from_cluster_snapshot),
                );
            }
            Ok::<_, AwsError>(snapshots)
        })?;

        Ok(snapshots)
    }

    fn describe_db_snapshots(&self, instance_id: &str) -> Result<Vec<RdsSnapshot>> {
        let request = self
            .client
            .describe_db_snapshots()
            .db_instance_identifier(instance_id)
            .snapshot_type(MANUAL_SNAPSHOT_TYPE);

        let snapshots = self.context.block_on(async {
            let mut snapshots = Vec::new();
            let mut pages = request.into_paginator().send();
            while let Some(page) = pages.next().await {
                let page = page.map_err(|e| AwsError::sdk("DescribeDBSnapshots", e))?;
                snapshots.extend(page.db_snapshots().iter().filter_map(from_db_snapshot));
            }
            Ok::<_, AwsError>(snapshots)
        })?;

        Ok(snapshots)
    }

    fn delete_db_cluster_snapshot(&self, snapshot_id: &str) -> Result<()> {
        self.context
            .block_on(
                self.client
                    .delete_db_cluster_snapshot()
                    .db_cluster_snapshot_identifier(snapshot_id)
                    .send(),
            )
            .map_err(|e| AwsError::sdk("DeleteDBClusterSnapshot", e))?;

        Ok(())
    }

    fn delete_db_snapshot(&self, snapshot_id: &str) -> Result<()> {
        self.context
            .block_on(
                self.client
                    .delete_db_snapshot()
                    .db_snapshot_identifier(snapshot_id)
                    .send(),
            )
            .map_err(|e| AwsError::sdk("DeleteDBSnapshot", e))?;

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
    pub enum RdsCall {
        DescribeDbClusters,
        DescribeDbInstances,
        ListTagsForResource { arn: String },
        DescribeSecurityGroupOwner,
        CreateDbClusterSnapshot { cluster_id: String, snapshot_id: String, tags: TagSet },
        CreateDbSnapshot { instance_id: String, snapshot_id: String, tags: TagSet },
        ShareDbClusterSnapshot { snapshot_id: String, account: String },
        ShareDbSnapshot { snapshot_id: String, account: String },
        DescribeDbClusterSnapshots { cluster_id: String },
        DescribeDbSnapshots { instance_id: String },
        DeleteDbClusterSnapshot { snapshot_id: String },
        DeleteDbSnapshot { snapshot_id: String },
    }

    /// In-memory RDS account
    #[derive(Clone)]
    pub struct MockRdsOps {
        pub region: String,
        /// Recorded operation calls
        pub calls: Arc<Mutex<Vec<RdsCall>>>,
        pub clusters: Arc<Mutex<Vec<DbCluster>>>,
        pub instances: Arc<Mutex<Vec<DbInstance>>>,
        /// Tags keyed by ARN
        pub tags: Arc<Mutex<HashMap<String, Vec<(String, String)>>>>,
        /// Owner id of the first DB security group
        pub security_group_owner: Arc<Mutex<Option<String>>>,
        pub cluster_snapshots: Arc<Mutex<Vec<RdsSnapshot>>>,
        pub db_snapshots: Arc<Mutex<Vec<RdsSnapshot>>>,
        /// Snapshot id to the accounts it was shared with
        pub shares: Arc<Mutex<HashMap<String, Vec<String>>>>,
        /// Source ids whose snapshot creation fails
        pub failing_create: Arc<Mutex<HashSet<String>>>,
        /// Start time handed to the next created snapshot, `None` leaves it unset
        pub clock: Arc<Mutex<Option<DateTime<Utc>>>>,
    }

    impl Default for MockRdsOps {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockRdsOps {
        pub fn new() -> Self {
            Self {
                region: "ap-southeast-2".to_string(),
                calls: Arc::new(Mutex::new(Vec::new())),
                clusters: Arc::new(Mutex::new(Vec::new())),
                instances: Arc::new(Mutex::new(Vec::new())),
                tags: Arc::new(Mutex::new(HashMap::new())),
                security_group_owner: Arc::new(Mutex::new(None)),
                cluster_snapshots: Arc::new(Mutex::new(Vec::new())),
                db_snapshots: Arc::new(Mutex::new(Vec::new())),
                shares: Arc::new(Mutex::new(HashMap::new())),
                failing_create: Arc::new(Mutex::new(HashSet::new())),
                clock: Arc::new(Mutex::new(Some(
                    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
                ))),
            }
        }

        pub fn with_region(mut self, region: &str) -> Self {
            self.region = region.to_string();
            self
        }

        /// Add a cluster; `arn` of `None` forces the adapter to build one
        pub fn with_cluster(self, identifier: &str, arn: Option<&str>) -> Self {
            self.clusters.lock().unwrap().push(DbCluster {
                identifier: identifier.to_string(),
                arn: arn.map(String::from),
            });
            self
        }

        pub fn with_instance(
            self,
            identifier: &str,
            arn: Option<&str>,
            cluster_identifier: Option<&str>,
        ) -> Self {
            self.instances.lock().unwrap().push(DbInstance {
                identifier: identifier.to_string(),
                arn: arn.map(String::from),
                cluster_identifier: cluster_identifier.map(String::from),
            });
            self
        }

        pub fn with_tags(self, arn: &str, tags: &[(&str, &str)]) -> Self {
            self.tags.lock().unwrap().insert(
                arn.to_string(),
                tags.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            );
            self
        }

        pub fn with_security_group_owner(self, owner: &str) -> Self {
            *self.security_group_owner.lock().unwrap() = Some(owner.to_string());
            self
        }

        pub fn with_cluster_snapshot(
            self,
            cluster_id: &str,
            identifier: &str,
            create_time: Option<DateTime<Utc>>,
        ) -> Self {
            self.cluster_snapshots.lock().unwrap().push(RdsSnapshot {
                identifier: identifier.to_string(),
                source_identifier: cluster_id.to_string(),
                create_time,
            });
            self
        }

        pub fn with_db_snapshot(
            self,
            instance_id: &str,
            identifier: &str,
            create_time: Option<DateTime<Utc>>,
        ) -> Self {
            self.db_snapshots.lock().unwrap().push(RdsSnapshot {
                identifier: identifier.to_string(),
                source_identifier: instance_id.to_string(),
                create_time,
            });
            self
        }

        pub fn with_failing_create(self, source_id: &str) -> Self {
            self.failing_create.lock().unwrap().insert(source_id.to_string());
            self
        }

        /// Set the create time of the next created snapshot
        pub fn with_clock(self, now: DateTime<Utc>) -> Self {
            *self.clock.lock().unwrap() = Some(now);
            self
        }

        /// Leave the create time of new snapshots unset, as a pending snapshot reports it
        pub fn with_pending_creates(self) -> Self {
            *self.clock.lock().unwrap() = None;
            self
        }

        fn record_call(&self, call: RdsCall) {
            self.calls.lock().unwrap().push(call);
        }

        pub fn recorded_calls(&self) -> Vec<RdsCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn shares_for(&self, snapshot_id: &str) -> Vec<String> {
            self.shares
                .lock()
                .unwrap()
                .get(snapshot_id)
                .cloned()
                .unwrap_or_default()
        }

        fn tick(&self) -> Option<DateTime<Utc>> {
            let mut clock = self.clock.lock().unwrap();
            let now = *clock;
            if let Some(t) = now {
                *clock = Some(t + Duration::minutes(1));
            }
            now
        }

        fn create(
            &self,
            store: &Mutex<Vec<RdsSnapshot>>,
            source_id: &str,
            snapshot_id: &str,
        ) -> Result<RdsSnapshot> {
            if self.failing_create.lock().unwrap().contains(source_id) {
                anyhow::bail!("Mock snapshot creation failure for {}", source_id);
            }
            let snapshot = RdsSnapshot {
                identifier: snapshot_id.to_string(),
                source_identifier: source_id.to_string(),
                create_time: self.tick(),
            };
            store.lock().unwrap().push(snapshot.clone());
            Ok(snapshot)
        }

        fn share(&self, snapshot_id: &str, account: &str) {
            self.shares
                .lock()
                .unwrap()
                .entry(snapshot_id.to_string())
                .or_default()
                .push(account.to_string());
        }
    }

    impl RdsOperations for MockRdsOps {
        fn region(&self) -> &str {
            &self.region
        }

        fn describe_db_clusters(&self) -> Result<Vec<DbCluster>> {
            self.record_call(RdsCall::DescribeDbClusters);
            Ok(self.clusters.lock().unwrap().clone())
        }

        fn describe_db_instances(&self) -> Result<Vec<DbInstance>> {
            self.record_call(RdsCall::DescribeDbInstances);
            Ok(self.instances.lock().unwrap().clone())
        }

        fn list_tags_for_resource(&self, arn: &str) -> Result<Vec<(String, String)>> {
            self.record_call(RdsCall::ListTagsForResource {
                arn: arn.to_string(),
            });
            Ok(self
                .tags
                .lock()
                .unwrap()
                .get(arn)
                .cloned()
                .unwrap_or_default())
        }

        fn describe_security_group_owner(&self) -> Result<Option<String>> {
            self.record_call(RdsCall::DescribeSecurityGroupOwner);
            Ok(self.security_group_owner.lock().unwrap().clone())
        }

        fn create_db_cluster_snapshot(
            &self,
            cluster_id: &str,
            snapshot_id: &str,
            tags: &TagSet,
        ) -> Result<RdsSnapshot> {
            self.record_call(RdsCall::CreateDbClusterSnapshot {
                cluster_id: cluster_id.to_string(),
                snapshot_id: snapshot_id.to_string(),
                tags: tags.clone(),
            });
            self.create(&self.cluster_snapshots, cluster_id, snapshot_id)
        }

        fn create_db_snapshot(
            &self,
            instance_id: &str,
            snapshot_id: &str,
            tags: &TagSet,
        ) -> Result<RdsSnapshot> {
            self.record_call(RdsCall::CreateDbSnapshot {
                instance_id: instance_id.to_string(),
                snapshot_id: snapshot_id.to_string(),
                tags: tags.clone(),
            });
            self.create(&self.db_snapshots, instance_id, snapshot_id)
        }

        fn share_db_cluster_snapshot(&self, snapshot_id: &str, account: &str) -> Result<()> {
            self.record_call(RdsCall::ShareDbClusterSnapshot {
                snapshot_id: snapshot_id.to_string(),
                account: account.to_string(),
            });
            self.share(snapshot_id, account);
            Ok(())
        }

        fn share_db_snapshot(&self, snapshot_id: &str, account: &str) -> Result<()> {
            self.record_call(RdsCall::ShareDbSnapshot {
                snapshot_id: snapshot_id.to_string(),
                account: account.to_string(),
            });
            self.share(snapshot_id, account);
            Ok(())
        }

        fn describe_db_cluster_snapshots(&self, cluster_id: &str) -> Result<Vec<RdsSnapshot>> {
            self.record_call(RdsCall::DescribeDbClusterSnapshots {
                cluster_id: cluster_id.to_string(),
            });
            Ok(self
                .cluster_snapshots
                .lock()
                .unwrap()
                .iter()
                .filter(|s| s.source_identifier == cluster_id)
                .cloned()
                .collect())
        }

        fn describe_db_snapshots(&self, instance_id: &str) -> Result<Vec<RdsSnapshot>> {
            self.record_call(RdsCall::DescribeDbSnapshots {
                instance_id: instance_id.to_string(),
            });
            Ok(self
                .db_snapshots
                .lock()
                .unwrap()
                .iter()
                .filter(|s| s.source_identifier == instance_id)
                .cloned()
                .collect())
        }

        fn delete_db_cluster_snapshot(&self, snapshot_id: &str) -> Result<()> {
            self.record_call(RdsCall::DeleteDbClusterSnapshot {
                snapshot_id: snapshot_id.to_string(),
            });
            self.cluster_snapshots
                .lock()
                .unwrap()
                .retain(|s| s.identifier != snapshot_id);
            Ok(())
        }

        fn delete_db_snapshot(&self, snapshot_id: &str) -> Result<()> {
            self.record_call(RdsCall::DeleteDbSnapshot {
                snapshot_id: snapshot_id.to_string(),
            });
            self.db_snapshots
                .lock()
                .unwrap()
                .retain(|s| s.identifier != snapshot_id);
            Ok(())
        }
    }
}
