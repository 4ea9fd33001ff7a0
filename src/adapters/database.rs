//! Managed database adapter (RDS instances and clusters)
//!
//! Clusters and standalone instances share one tag and snapshot vocabulary
//! but use different API families. Instances that are members of a cluster
//! are skipped during enumeration because the cluster snapshot covers them.

use super::{ResourceAdapter, ResourceKind, SnapshotRequest, TagSet};
use crate::config::TagFilter;
use crate::utils::aws::user_tags;
use crate::utils::rds::{DbCluster, DbInstance, RdsOperations, RdsSnapshot};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use tracing::{debug, info};

/// Account number used in built ARNs when no DB security group reveals one
const UNKNOWN_ACCOUNT: &str = "0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseResource {
    Cluster(DbCluster),
    Instance(DbInstance),
}

impl DatabaseResource {
    pub fn identifier(&self) -> &str {
        match self {
            DatabaseResource::Cluster(c) => &c.identifier,
            DatabaseResource::Instance(i) => &i.identifier,
        }
    }

    fn reported_arn(&self) -> Option<&str> {
        match self {
            DatabaseResource::Cluster(c) => c.arn.as_deref(),
            DatabaseResource::Instance(i) => i.arn.as_deref(),
        }
    }

    /// Resource type segment of an RDS ARN
    fn arn_type(&self) -> &'static str {
        match self {
            DatabaseResource::Cluster(_) => "cluster",
            DatabaseResource::Instance(_) => "db",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseSnapshot {
    Cluster(RdsSnapshot),
    Instance(RdsSnapshot),
}

impl DatabaseSnapshot {
    pub fn inner(&self) -> &RdsSnapshot {
        match self {
            DatabaseSnapshot::Cluster(s) | DatabaseSnapshot::Instance(s) => s,
        }
    }
}

/// Snapshot identifier: `{period}-{id}-{dd-mm-YYYY-HH-MM-SS}-{date_suffix}`
pub fn build_snapshot_identifier(
    period: &str,
    backupable_id: &str,
    requested_at: DateTime<Utc>,
    date_suffix: &str,
) -> String {
    format!(
        "{}-{}-{}-{}",
        period,
        backupable_id,
        requested_at.format("%d-%m-%Y-%H-%M-%S"),
        date_suffix
    )
}

pub struct DatabaseAdapter<O: RdsOperations> {
    ops: O,
    share_account: Option<String>,
    /// Resolved once per adapter on first use
    account_number: Mutex<Option<String>>,
    now: fn() -> DateTime<Utc>,
}

impl<O: RdsOperations> DatabaseAdapter<O> {
    pub fn new(ops: O, share_account: Option<String>) -> Self {
        Self {
            ops,
            share_account,
            account_number: Mutex::new(None),
            now: Utc::now,
        }
    }

    /// Replace the clock used for snapshots that report no create time
    pub fn with_clock(mut self, now: fn() -> DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn ops(&self) -> &O {
        &self.ops
    }

    fn account_number(&self) -> Result<String> {
        let mut cached = self
            .account_number
            .lock()
            .map_err(|_| anyhow::anyhow!("Account number cache poisoned"))?;

        if let Some(account) = cached.as_ref() {
            return Ok(account.clone());
        }

        let account = self
            .ops
            .describe_security_group_owner()
            .context("Failed to resolve account number")?
            .unwrap_or_else(|| UNKNOWN_ACCOUNT.to_string());

        debug!("Resolved RDS account number: {}", account);
        *cached = Some(account.clone());
        Ok(account)
    }

    /// Provider-reported ARN, or one built from region and account
    pub fn resolve_arn(&self, resource: &DatabaseResource) -> Result<String> {
        if let Some(arn) = resource.reported_arn() {
            return Ok(arn.to_string());
        }

        Ok(format!(
            "arn:aws:rds:{}:{}:{}:{}",
            self.ops.region(),
            self.account_number()?,
            resource.arn_type(),
            resource.identifier()
        ))
    }

    fn raw_tags(&self, resource: &DatabaseResource) -> Result<Vec<(String, String)>> {
        let arn = self.resolve_arn(resource)?;
        self.ops
            .list_tags_for_resource(&arn)
            .with_context(|| format!("Failed to read tags of {}", arn))
    }

    fn has_tag(&self, resource: &DatabaseResource, tag_filter: &TagFilter) -> Result<bool> {
        Ok(self
            .raw_tags(resource)?
            .iter()
            .any(|(k, v)| *k == tag_filter.name && *v == tag_filter.value))
    }
}

impl<O: RdsOperations> ResourceAdapter for DatabaseAdapter<O> {
    type Resource = DatabaseResource;
    type Snapshot = DatabaseSnapshot;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Database
    }

    fn list_backupable_resources(&self, tag_filter: &TagFilter) -> Result<Vec<DatabaseResource>> {
        info!("Finding databases that match the requested tag ({})", tag_filter);

        let mut found = Vec::new();

        let clusters = self
            .ops
            .describe_db_clusters()
            .context("Failed to list DB clusters")?;
        for cluster in clusters {
            let resource = DatabaseResource::Cluster(cluster);
            if self.has_tag(&resource, tag_filter)? {
                found.push(resource);
            }
        }

        let instances = self
            .ops
            .describe_db_instances()
            .context("Failed to list DB instances")?;
        for instance in instances {
            if instance.cluster_identifier.is_some() {
                debug!("Skipping cluster member {}", instance.identifier);
                continue;
            }
            let resource = DatabaseResource::Instance(instance);
            if self.has_tag(&resource, tag_filter)? {
                found.push(resource);
            }
        }

        info!("Found {} databases to manage", found.len());
        Ok(found)
    }

    fn resolve_id(&self, resource: &DatabaseResource) -> String {
        resource.identifier().to_string()
    }

    fn get_tags(&self, resource: &DatabaseResource) -> Result<TagSet> {
        Ok(user_tags(self.raw_tags(resource)?))
    }

    fn create_snapshot(
        &self,
        resource: &DatabaseResource,
        request: &SnapshotRequest,
    ) -> Result<DatabaseSnapshot> {
        let snapshot_id = build_snapshot_identifier(
            &request.period,
            &request.backupable_id,
            request.requested_at,
            &request.date_suffix,
        );

        // Tags travel with the create call
        let snapshot = match resource {
            DatabaseResource::Cluster(cluster) => DatabaseSnapshot::Cluster(
                self.ops
                    .create_db_cluster_snapshot(&cluster.identifier, &snapshot_id, &request.tags)
                    .with_context(|| format!("Failed to snapshot cluster {}", cluster.identifier))?,
            ),
            DatabaseResource::Instance(instance) => DatabaseSnapshot::Instance(
                self.ops
                    .create_db_snapshot(&instance.identifier, &snapshot_id, &request.tags)
                    .with_context(|| format!("Failed to snapshot {}", instance.identifier))?,
            ),
        };

        Ok(snapshot)
    }

    fn propagate(&self, snapshot: &DatabaseSnapshot, _request: &SnapshotRequest) -> Result<()> {
        let Some(account) = &self.share_account else {
            return Ok(());
        };

        let snapshot_id = &snapshot.inner().identifier;
        info!("Sharing RDS snapshot {} with {}", snapshot_id, account);
        let shared = match snapshot {
            DatabaseSnapshot::Cluster(s) => self.ops.share_db_cluster_snapshot(&s.identifier, account),
            DatabaseSnapshot::Instance(s) => self.ops.share_db_snapshot(&s.identifier, account),
        };
        shared.with_context(|| format!("Failed to share {}", snapshot_id))
    }

    fn list_snapshots(&self, resource: &DatabaseResource) -> Result<Vec<DatabaseSnapshot>> {
        let snapshots = match resource {
            DatabaseResource::Cluster(cluster) => self
                .ops
                .describe_db_cluster_snapshots(&cluster.identifier)
                .with_context(|| format!("Failed to list snapshots of {}", cluster.identifier))?
                .into_iter()
                .map(DatabaseSnapshot::Cluster)
                .collect(),
            DatabaseResource::Instance(instance) => self
                .ops
                .describe_db_snapshots(&instance.identifier)
                .with_context(|| format!("Failed to list snapshots of {}", instance.identifier))?
                .into_iter()
                .map(DatabaseSnapshot::Instance)
                .collect(),
        };
        Ok(snapshots)
    }

    fn snapshot_label(&self, snapshot: &DatabaseSnapshot) -> String {
        snapshot.inner().identifier.clone()
    }

    fn snapshot_time(&self, snapshot: &DatabaseSnapshot) -> DateTime<Utc> {
        snapshot.inner().create_time.unwrap_or_else(self.now)
    }

    fn delete_snapshot(&self, snapshot: &DatabaseSnapshot) -> Result<()> {
        match snapshot {
            DatabaseSnapshot::Cluster(s) => self.ops.delete_db_cluster_snapshot(&s.identifier),
            DatabaseSnapshot::Instance(s) => self.ops.delete_db_snapshot(&s.identifier),
        }
        .with_context(|| format!("Failed to delete {}", snapshot.inner().identifier))
    }
}
