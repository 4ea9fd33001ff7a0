//! Test fixtures and sample data

use chrono::{DateTime, Duration, TimeZone, Utc};
use snapshot_rotator::config::{BackupRun, TagFilter};
use snapshot_rotator::utils::ec2::mock::MockEc2Ops;

pub const VOLUME_TAG: (&str, &str) = ("MakeSnapshot", "True");
pub const DATABASE_TAG: (&str, &str) = ("Environment", "prod");
pub const SHARE_ACCOUNT: &str = "444455556666";

/// Wednesday 15 January 2025, 09:30 UTC
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 9, 30, 0).unwrap()
}

/// Midnight `n` days before [`fixed_now`]
pub fn days_ago(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap() - Duration::days(n)
}

pub fn volume_filter() -> TagFilter {
    TagFilter {
        name: VOLUME_TAG.0.to_string(),
        value: VOLUME_TAG.1.to_string(),
    }
}

pub fn database_filter() -> TagFilter {
    TagFilter {
        name: DATABASE_TAG.0.to_string(),
        value: DATABASE_TAG.1.to_string(),
    }
}

pub fn daily_run(tag_filter: TagFilter, keep_count: u32) -> BackupRun {
    BackupRun {
        period: "day".to_string(),
        tag_filter,
        date_suffix: "Wed09".to_string(),
        keep_count,
    }
}

/// EBS description of a daily snapshot
pub fn daily_description(volume_id: &str, suffix: &str) -> String {
    format!(
        "day_snapshot {}_day_{} by snapshot script at 01-01-2025 00:00:00",
        volume_id, suffix
    )
}

/// One tagged volume with `count` daily snapshots, oldest first, named
/// `snap-d{n}` where n is the age in days
pub fn volume_with_daily_snapshots(volume_id: &str, count: i64) -> MockEc2Ops {
    let mut mock = MockEc2Ops::new()
        .with_clock(fixed_now())
        .with_volume(volume_id, &[VOLUME_TAG, ("Name", "data")]);

    for age in (1..=count).rev() {
        mock = mock.with_snapshot(
            volume_id,
            &format!("snap-d{}", age),
            &daily_description(volume_id, &format!("d{}", age)),
            Some(days_ago(age)),
        );
    }
    mock
}
