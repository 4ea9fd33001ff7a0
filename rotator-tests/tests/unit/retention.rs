//! Retention properties of the engine driving the volume adapter

use rstest::rstest;
use snapshot_rotator::adapters::VolumeAdapter;
use test_utils::*;

fn run_volume(ec2: &MockEc2Ops, keep_count: u32, options: EngineOptions) -> RunReport {
    let adapter = VolumeAdapter::new(ec2.clone(), None);
    let run = daily_run(volume_filter(), keep_count);
    RetentionEngine::new(&run, options)
        .with_clock(fixed_now)
        .run(&adapter)
        .expect("enumeration should succeed")
}

#[rstest]
fn test_remaining_is_min_of_count_and_keep(
    #[values(0, 1, 3, 6)] count: i64,
    #[values(0, 1, 3, 8)] keep: u32,
) {
    // Creation refused so only the pre-existing snapshots are rotated
    let ec2 = volume_with_daily_snapshots("vol-1", count).with_failing_create("vol-1");

    let report = run_volume(&ec2, keep, EngineOptions::default());

    let excess = (count as usize).saturating_sub(keep as usize);
    assert_eq!(report.metrics.total_deletes as usize, excess);
    assert_eq!(report.metrics.total_errors, 0);
    assert_eq!(
        ec2.snapshot_ids("vol-1").len(),
        (count as usize).min(keep as usize)
    );

    // Exactly the oldest go
    let expected: Vec<String> = (0..excess as i64)
        .map(|i| format!("snap-d{}", count - i))
        .collect();
    assert_eq!(ec2.deleted_ids(), expected);
}

#[test]
fn test_new_snapshot_joins_rotation() {
    let ec2 = volume_with_daily_snapshots("vol-1", 3);

    let report = run_volume(&ec2, 3, EngineOptions::default());

    assert_eq!(report.metrics.total_creates, 1);
    assert_eq!(report.metrics.total_deletes, 1);
    assert_eq!(ec2.deleted_ids(), vec!["snap-d3"]);

    let remaining = ec2.snapshot_ids("vol-1");
    assert_eq!(remaining.len(), 3);
    assert!(remaining.iter().any(|id| id.starts_with("snap-new")));
}

#[test]
fn test_five_snapshots_keep_three() {
    let ec2 = volume_with_daily_snapshots("vol-1", 5).with_failing_create("vol-1");

    let report = run_volume(&ec2, 3, EngineOptions::default());

    assert_eq!(ec2.deleted_ids(), vec!["snap-d5", "snap-d4"]);
    assert_eq!(report.metrics.total_deletes, 2);
}

#[test]
fn test_other_schedules_untouched() {
    let ec2 = volume_with_daily_snapshots("vol-1", 2)
        .with_snapshot("vol-1", "snap-w1", "week_snapshot vol-1_week_02", Some(days_ago(30)))
        .with_snapshot("vol-1", "snap-manual", "created by hand", Some(days_ago(40)));

    run_volume(&ec2, 0, EngineOptions::default());

    let remaining = ec2.snapshot_ids("vol-1");
    assert_eq!(remaining, vec!["snap-w1", "snap-manual"]);
}

#[test]
fn test_second_run_is_idempotent() {
    let ec2 = volume_with_daily_snapshots("vol-1", 4).with_failing_create("vol-1");

    let first = run_volume(&ec2, 2, EngineOptions::default());
    let second = run_volume(&ec2, 2, EngineOptions::default());

    assert_eq!(first.metrics.total_deletes, 2);
    assert_eq!(second.metrics.total_deletes, 0);
}

#[test]
fn test_listing_failure_isolated_per_volume() {
    let ec2 = MockEc2Ops::new()
        .with_clock(fixed_now())
        .with_volume("vol-1", &[VOLUME_TAG])
        .with_volume("vol-2", &[VOLUME_TAG])
        .with_volume("vol-3", &[VOLUME_TAG])
        .with_failing_list("vol-2");

    let report = run_volume(&ec2, 3, EngineOptions::default());

    assert_eq!(report.metrics.total_resources, 3);
    assert_eq!(report.metrics.total_errors, 1);
    assert_eq!(report.processed, 2);
    assert!(report
        .error_transcript
        .contains("Error in processing volume with id: vol-2"));
}

#[test]
fn test_tags_copied_without_reserved_keys() {
    let ec2 = MockEc2Ops::new().with_clock(fixed_now()).with_volume(
        "vol-1",
        &[
            VOLUME_TAG,
            ("Name", "data"),
            ("aws:cloudformation:stack-name", "infra"),
        ],
    );

    run_volume(&ec2, 3, EngineOptions::default());

    let created = ec2.snapshot_ids("vol-1");
    let tags = ec2.tags_for(&created[0]).assert_some();
    assert_eq!(tags.len(), 2);
    assert_eq!(tags.get("Name").map(String::as_str), Some("data"));
    assert!(!tags.keys().any(|k| k.starts_with("aws:")));
}

#[test]
fn test_snapshot_shared_when_account_configured() {
    let ec2 = MockEc2Ops::new()
        .with_clock(fixed_now())
        .with_volume("vol-1", &[VOLUME_TAG]);
    let adapter = VolumeAdapter::new(ec2.clone(), Some(SHARE_ACCOUNT.to_string()));
    let run = daily_run(volume_filter(), 3);

    RetentionEngine::new(&run, EngineOptions::default())
        .with_clock(fixed_now)
        .run(&adapter)
        .assert_ok();

    let created = ec2.snapshot_ids("vol-1");
    assert_eq!(ec2.shares_for(&created[0]), vec![SHARE_ACCOUNT]);
}

#[rstest]
#[case(CreationFailurePolicy::Log, 0, 1)]
#[case(CreationFailurePolicy::Error, 1, 0)]
fn test_creation_failure_policy(
    #[case] policy: CreationFailurePolicy,
    #[case] errors: u32,
    #[case] deletes: u32,
) {
    let ec2 = volume_with_daily_snapshots("vol-1", 3).with_failing_create("vol-1");

    let report = run_volume(
        &ec2,
        2,
        EngineOptions {
            creation_failure: policy,
            dry_run: false,
        },
    );

    assert_eq!(report.metrics.total_errors, errors);
    assert_eq!(report.metrics.total_deletes, deletes);
    assert_eq!(report.metrics.total_creates, 0);
}

#[rstest]
#[case(CreationFailurePolicy::Log)]
#[case(CreationFailurePolicy::Error)]
fn test_tag_failure_after_create_is_resource_error(#[case] policy: CreationFailurePolicy) {
    let ec2 = volume_with_daily_snapshots("vol-1", 2).with_failing_tags();

    let report = run_volume(
        &ec2,
        1,
        EngineOptions {
            creation_failure: policy,
            dry_run: false,
        },
    );

    assert_eq!(report.metrics.total_creates, 1);
    assert_eq!(report.metrics.total_errors, 1);
    assert_eq!(report.metrics.total_deletes, 0);
    assert_eq!(report.processed, 0);
    assert!(report
        .error_transcript
        .contains("Error in processing volume with id: vol-1"));
    assert!(report.error_transcript.contains("Failed to tag snap-new0001"));

    // The untagged snapshot exists and nothing was rotated away
    assert_eq!(ec2.snapshot_ids("vol-1").len(), 3);
    ec2.tags_for("snap-new0001").assert_none();
}

#[test]
fn test_dry_run_leaves_account_untouched() {
    let ec2 = volume_with_daily_snapshots("vol-1", 4);

    let report = run_volume(
        &ec2,
        2,
        EngineOptions {
            dry_run: true,
            ..Default::default()
        },
    );

    assert_eq!(report.metrics.total_creates, 1);
    assert_eq!(report.metrics.total_deletes, 2);
    assert_eq!(ec2.snapshot_ids("vol-1").len(), 4);
    assert!(!ec2
        .recorded_calls()
        .iter()
        .any(|c| matches!(c, Ec2Call::CreateSnapshot { .. } | Ec2Call::DeleteSnapshot { .. })));
}

#[test]
fn test_no_matching_volumes() {
    let ec2 = MockEc2Ops::new().with_volume("vol-1", &[("MakeSnapshot", "False")]);

    let report = run_volume(&ec2, 3, EngineOptions::default());

    assert_eq!(report.metrics, RunMetrics::default());
    assert!(report.transcript.starts_with("Started taking day snapshots at"));
    assert!(report.transcript.contains("with 0 snapshots of 0 possible."));
}

#[test]
fn test_enumeration_failure_propagates() {
    let ec2 = MockEc2Ops::new().with_failing_describe_volumes();
    let adapter = VolumeAdapter::new(ec2, None);
    let run = daily_run(volume_filter(), 3);

    RetentionEngine::new(&run, EngineOptions::default())
        .run(&adapter)
        .assert_err_contains("Failed to enumerate volume resources");
}
