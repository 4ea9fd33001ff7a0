//! Retention engine - snapshot, classify and rotate for one resource type
//!
//! One pass per invocation:
//!
//! 1. enumerate the resources matching the tag filter
//! 2. per resource: copy tags onto a new snapshot, list all snapshots,
//!    keep only those whose label carries the period prefix, order them by
//!    creation time and delete the oldest beyond the keep count
//! 3. summarize the counters
//!
//! Failures inside step 2 are contained to the resource they occurred on.
//! Only an enumeration failure aborts the pass.

use crate::adapters::{ResourceAdapter, SnapshotRequest};
use crate::config::{BackupRun, CreationFailurePolicy};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Timestamp layout used in transcripts and descriptions
const TRANSCRIPT_TIME_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

const RULE: &str = "    ---------------------------";

/// Counters reported for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub total_resources: u32,
    pub total_creates: u32,
    pub total_errors: u32,
    pub total_deletes: u32,
}

impl RunMetrics {
    /// Add another run's counters to these
    pub fn merge(&mut self, other: &RunMetrics) {
        self.total_resources += other.total_resources;
        self.total_creates += other.total_creates;
        self.total_errors += other.total_errors;
        self.total_deletes += other.total_deletes;
    }
}

/// Outcome of one engine pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub metrics: RunMetrics,
    /// Resources that finished without a resource-level error
    pub processed: u32,
    /// Informational transcript, always contains start and finish markers
    pub transcript: String,
    /// Resource-level errors, empty on a clean run
    pub error_transcript: String,
}

impl RunReport {
    fn line(&mut self, text: impl AsRef<str>) {
        self.transcript.push_str(text.as_ref());
        self.transcript.push('\n');
    }

    fn error_line(&mut self, text: impl AsRef<str>) {
        self.error_transcript.push_str(text.as_ref());
        self.error_transcript.push('\n');
    }

    pub fn has_errors(&self) -> bool {
        !self.error_transcript.is_empty()
    }
}

/// Switches that change how the engine treats a pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    pub creation_failure: CreationFailurePolicy,
    /// Read everything, change nothing
    pub dry_run: bool,
}

pub struct RetentionEngine<'a> {
    run: &'a BackupRun,
    options: EngineOptions,
    now: fn() -> DateTime<Utc>,
}

impl<'a> RetentionEngine<'a> {
    pub fn new(run: &'a BackupRun, options: EngineOptions) -> Self {
        Self {
            run,
            options,
            now: Utc::now,
        }
    }

    /// Replace the clock used for transcript timestamps and snapshot requests
    pub fn with_clock(mut self, now: fn() -> DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    fn timestamp(&self) -> String {
        (self.now)().format(TRANSCRIPT_TIME_FORMAT).to_string()
    }

    /// Execute one rotation pass over every matching resource.
    ///
    /// Returns `Err` only when the resources cannot be enumerated.
    pub fn run<A: ResourceAdapter>(&self, adapter: &A) -> Result<RunReport> {
        let kind = adapter.kind();
        let mut report = RunReport::default();

        let start = format!(
            "Started taking {} snapshots at {}",
            self.run.period,
            self.timestamp()
        );
        info!("{} ({})", start, kind);
        report.line(start);
        report.line("");

        let resources = adapter
            .list_backupable_resources(&self.run.tag_filter)
            .with_context(|| format!("Failed to enumerate {} resources", kind))?;

        for resource in &resources {
            report.metrics.total_resources += 1;
            let id = adapter.resolve_id(resource);
            report.line(format!("Processing backup item {}", id));

            match self.process_resource(adapter, resource, &id, &mut report) {
                Ok(()) => report.processed += 1,
                Err(e) => {
                    error!("Error in processing {} with id {}: {:#}", kind, id, e);
                    report.metrics.total_errors += 1;
                    report.error_line(format!(
                        "Error in processing {} with id: {}: {:#}",
                        kind, id, e
                    ));
                }
            }
        }

        report.line("");
        report.line(format!(
            "Finished making snapshots at {} with {} snapshots of {} possible.",
            self.timestamp(),
            report.processed,
            report.metrics.total_resources
        ));
        report.line("");
        report.line(format!("Total snapshots created: {}", report.metrics.total_creates));
        report.line(format!("Total snapshots errors: {}", report.metrics.total_errors));
        report.line(format!("Total snapshots deleted: {}", report.metrics.total_deletes));

        info!(
            "Finished {} rotation: {} resources, {} created, {} deleted, {} errors",
            kind,
            report.metrics.total_resources,
            report.metrics.total_creates,
            report.metrics.total_deletes,
            report.metrics.total_errors
        );

        Ok(report)
    }

    fn process_resource<A: ResourceAdapter>(
        &self,
        adapter: &A,
        resource: &A::Resource,
        id: &str,
        report: &mut RunReport,
    ) -> Result<()> {
        let tags = adapter.get_tags(resource)?;

        let requested_at = (self.now)();
        let description = format!(
            "{period}_snapshot {id}_{period}_{suffix} by snapshot script at {at}",
            period = self.run.period,
            id = id,
            suffix = self.run.date_suffix,
            at = requested_at.format(TRANSCRIPT_TIME_FORMAT),
        );

        let request = SnapshotRequest {
            period: self.run.period.clone(),
            backupable_id: id.to_string(),
            date_suffix: self.run.date_suffix.clone(),
            description,
            tags,
            requested_at,
        };

        self.create(adapter, resource, &request, report)?;

        let snapshots = adapter.list_snapshots(resource)?;
        let prefix = adapter.period_prefix(&self.run.period);

        let mut rotation = Vec::new();
        for snapshot in snapshots {
            let label = adapter.snapshot_label(&snapshot);
            if label.starts_with(&prefix) {
                rotation.push((adapter.snapshot_time(&snapshot), label, snapshot));
            } else {
                info!("Skipping other backup schedule: {}", label);
            }
        }

        // Stable: equal timestamps keep listing order
        rotation.sort_by_key(|(time, _, _)| *time);

        report.line("");
        report.line(format!(
            "    Current backups in rotation (keeping {})",
            self.run.keep_count
        ));
        report.line(RULE);
        for (time, label, _) in &rotation {
            report.line(format!("    {} - {}", label, time));
        }
        report.line(RULE);

        let excess = rotation
            .len()
            .saturating_sub(self.run.keep_count as usize);

        for (_, label, snapshot) in rotation.iter().take(excess) {
            if self.options.dry_run {
                report.line(format!("    [DRY RUN] Would delete snapshot {}", label));
            } else {
                report.line(format!("    Deleting snapshot {}", label));
                adapter.delete_snapshot(snapshot)?;
            }
            report.metrics.total_deletes += 1;
        }

        Ok(())
    }

    fn create<A: ResourceAdapter>(
        &self,
        adapter: &A,
        resource: &A::Resource,
        request: &SnapshotRequest,
        report: &mut RunReport,
    ) -> Result<()> {
        if self.options.dry_run {
            report.line(format!(
                "    [DRY RUN] Would create snapshot with description: {} and tags: {:?}",
                request.description, request.tags
            ));
            report.metrics.total_creates += 1;
            return Ok(());
        }

        match adapter.create_snapshot(resource, request) {
            Ok(snapshot) => {
                report.line(format!(
                    "    New Snapshot created with description: {} and tags: {:?}",
                    request.description, request.tags
                ));
                report.metrics.total_creates += 1;

                // The snapshot exists now, so this is never a creation failure
                adapter.propagate(&snapshot, request).with_context(|| {
                    format!(
                        "Snapshot {} created but tagging or sharing failed",
                        adapter.snapshot_label(&snapshot)
                    )
                })
            }
            Err(e) => match self.options.creation_failure {
                CreationFailurePolicy::Log => {
                    warn!(
                        "Failed to create snapshot of {}, continuing with rotation: {:#}",
                        request.backupable_id, e
                    );
                    report.line(format!("    Failed to create snapshot: {:#}", e));
                    Ok(())
                }
                CreationFailurePolicy::Error => Err(e.context("Snapshot creation failed")),
            },
        }
    }
}
