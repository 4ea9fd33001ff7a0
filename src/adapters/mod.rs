pub mod database;
pub mod volume;

use crate::config::TagFilter;
use anyhow::Result;
use chrono::{DateTime, Utc};

pub use crate::utils::aws::TagSet;
pub use database::{DatabaseAdapter, DatabaseResource, DatabaseSnapshot};
pub use volume::VolumeAdapter;

/// Class of resource an adapter handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Volume,
    Database,
}

impl ResourceKind {
    /// Wording used in transcripts and logs
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Volume => "volume",
            ResourceKind::Database => "database",
        }
    }

    /// Prefix of the per-type keys in the output payload
    pub fn output_prefix(&self) -> &'static str {
        match self {
            ResourceKind::Volume => "ec2",
            ResourceKind::Database => "rds",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything an adapter needs to take one snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRequest {
    pub period: String,
    pub backupable_id: String,
    pub date_suffix: String,
    /// Human-readable description, also the EC2 classification label
    pub description: String,
    /// User tags copied from the resource
    pub tags: TagSet,
    pub requested_at: DateTime<Utc>,
}

/// Capability set the rotation engine drives for one resource type
pub trait ResourceAdapter {
    type Resource;
    type Snapshot;

    fn kind(&self) -> ResourceKind;

    /// Label prefix a snapshot must carry to belong to `period`
    fn period_prefix(&self, period: &str) -> String {
        period.to_string()
    }

    /// Resources matching the tag filter; empty when nothing matches
    fn list_backupable_resources(&self, tag_filter: &TagFilter) -> Result<Vec<Self::Resource>>;

    fn resolve_id(&self, resource: &Self::Resource) -> String;

    /// User tags of the resource, reserved keys excluded
    fn get_tags(&self, resource: &Self::Resource) -> Result<TagSet>;

    /// Take a new snapshot of the resource
    fn create_snapshot(
        &self,
        resource: &Self::Resource,
        request: &SnapshotRequest,
    ) -> Result<Self::Snapshot>;

    /// Apply the request's tags to a snapshot that now exists and grant the
    /// share account access to it. Errors here leave an existing snapshot.
    fn propagate(&self, snapshot: &Self::Snapshot, request: &SnapshotRequest) -> Result<()>;

    /// Every snapshot of the resource, whatever its period
    fn list_snapshots(&self, resource: &Self::Resource) -> Result<Vec<Self::Snapshot>>;

    /// Name or description used for period classification
    fn snapshot_label(&self, snapshot: &Self::Snapshot) -> String;

    /// Creation time; snapshots without one count as just created
    fn snapshot_time(&self, snapshot: &Self::Snapshot) -> DateTime<Utc>;

    fn delete_snapshot(&self, snapshot: &Self::Snapshot) -> Result<()>;
}
