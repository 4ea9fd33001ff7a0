//! Block-storage volume adapter (EBS)

use super::{ResourceAdapter, ResourceKind, SnapshotRequest, TagSet};
use crate::config::TagFilter;
use crate::utils::aws::user_tags;
use crate::utils::ec2::{Ec2Operations, Ec2Snapshot, Volume};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

pub struct VolumeAdapter<O: Ec2Operations> {
    ops: O,
    share_account: Option<String>,
    now: fn() -> DateTime<Utc>,
}

impl<O: Ec2Operations> VolumeAdapter<O> {
    pub fn new(ops: O, share_account: Option<String>) -> Self {
        Self {
            ops,
            share_account,
            now: Utc::now,
        }
    }

    /// Replace the clock used for snapshots that report no start time
    pub fn with_clock(mut self, now: fn() -> DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn ops(&self) -> &O {
        &self.ops
    }
}

impl<O: Ec2Operations> ResourceAdapter for VolumeAdapter<O> {
    type Resource = Volume;
    type Snapshot = Ec2Snapshot;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Volume
    }

    /// EBS descriptions start with "{period}_snapshot"
    fn period_prefix(&self, period: &str) -> String {
        format!("{}_snapshot", period)
    }

    fn list_backupable_resources(&self, tag_filter: &TagFilter) -> Result<Vec<Volume>> {
        info!("Finding volumes that match the requested tag ({})", tag_filter);

        let volumes = self
            .ops
            .describe_volumes(tag_filter)
            .context("Failed to list volumes")?;

        info!("Found {} volumes to manage", volumes.len());
        Ok(volumes)
    }

    fn resolve_id(&self, resource: &Volume) -> String {
        resource.volume_id.clone()
    }

    fn get_tags(&self, resource: &Volume) -> Result<TagSet> {
        let tags = self
            .ops
            .describe_tags(&resource.volume_id)
            .with_context(|| format!("Failed to read tags of {}", resource.volume_id))?;
        Ok(user_tags(tags))
    }

    fn create_snapshot(&self, resource: &Volume, request: &SnapshotRequest) -> Result<Ec2Snapshot> {
        let snapshot = self
            .ops
            .create_snapshot(&resource.volume_id, &request.description)
            .with_context(|| format!("Failed to snapshot {}", resource.volume_id))
    }

    fn propagate(&self, snapshot: &Ec2Snapshot, request: &SnapshotRequest) -> Result<()> {
        if !request.tags.is_empty() {
            debug!("Tagging {} with {:?}", snapshot.snapshot_id, request.tags);
            self.ops
                .create_tags(&snapshot.snapshot_id, &request.tags)
                .with_context(|| format!("Failed to tag {}", snapshot.snapshot_id))?;
        }

        if let Some(account) = &self.share_account {
            info!("Sharing {} with {}", snapshot.snapshot_id, account);
            self.ops
                .share_snapshot(&snapshot.snapshot_id, account)
                .with_context(|| format!("Failed to share {}", snapshot.snapshot_id))?;
        }

        Ok(())
    }

    fn list_snapshots(&self, resource: &Volume) -> Result<Vec<Ec2Snapshot>> {
        self.ops
            .describe_snapshots(&resource.volume_id)
            .with_context(|| format!("Failed to list snapshots of {}", resource.volume_id))
    }

    fn snapshot_label(&self, snapshot: &Ec2Snapshot) -> String {
        snapshot.description.clone()
    }

    fn snapshot_time(&self, snapshot: &Ec2Snapshot) -> DateTime<Utc> {
        snapshot.start_time.unwrap_or_else(self.now)
    }

    fn delete_snapshot(&self, snapshot: &Ec2Snapshot) -> Result<()> {
        self.ops
            .delete_snapshot(&snapshot.snapshot_id)
            .with_context(|| format!("Failed to delete {}", snapshot.snapshot_id))
    }
}
