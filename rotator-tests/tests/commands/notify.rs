//! Notifications published by a run

use snapshot_rotator::managers::coordinator::{RunCoordinator, RunSettings};
use snapshot_rotator::managers::notification::ERROR_SUBJECT;
use test_utils::*;

const OK_TOPIC: &str = "arn:aws:sns:ap-southeast-2:123456789012:ok";
const ERR_TOPIC: &str = "arn:aws:sns:ap-southeast-2:123456789012:err";

fn run(factory: &MockProviderFactory, notifications_enabled: bool) -> Vec<Published> {
    let event = EventBuilder::daily()
        .ec2_tag(VOLUME_TAG.0, VOLUME_TAG.1)
        .rds_tag(DATABASE_TAG.0, DATABASE_TAG.1)
        .success_topic(OK_TOPIC)
        .error_topic(ERR_TOPIC)
        .build();

    let settings = RunSettings {
        notifications_enabled,
        ..Default::default()
    };
    RunCoordinator::new(factory.clone(), settings)
        .with_clock(fixed_now)
        .execute(event)
        .assert_ok();

    factory.publisher.messages()
}

#[test]
fn test_success_summary_per_type() {
    let factory = MockProviderFactory::new().with_ec2(volume_with_daily_snapshots("vol-1", 1));

    let sent = run(&factory, true);

    let subjects: Vec<&str> = sent.iter().map(|p| p.subject.as_str()).collect();
    assert_eq!(
        subjects,
        vec!["Finished AWS EC2 snapshotting", "Finished AWS RDS snapshotting"]
    );
    assert!(sent.iter().all(|p| p.topic == OK_TOPIC));
    assert!(sent[0].message.starts_with("Started taking day snapshots"));
}

#[test]
fn test_item_errors_go_to_error_topic_first() {
    let ec2 = volume_with_daily_snapshots("vol-1", 1)
        .with_volume("vol-2", &[VOLUME_TAG])
        .with_failing_list("vol-2");
    let factory = MockProviderFactory::new().with_ec2(ec2);

    let sent = run(&factory, true);

    assert_eq!(sent[0].topic, ERR_TOPIC);
    assert_eq!(sent[0].subject, ERROR_SUBJECT);
    assert!(sent[0].message.starts_with("Error in processing volumes: "));
    assert!(sent[0].message.contains("vol-2"));
    assert_eq!(sent[1].subject, "Finished AWS EC2 snapshotting");
}

#[test]
fn test_run_failure_notifies_error_topic() {
    let factory = MockProviderFactory::new()
        .with_ec2(volume_with_daily_snapshots("vol-1", 0))
        .with_failing_rds();

    let sent = run(&factory, true);

    let failure = sent
        .iter()
        .find(|p| p.topic == ERR_TOPIC)
        .assert_some();
    assert!(failure.message.starts_with("Error in processing RDS: "));
    assert!(failure.message.contains("Mock RDS client unavailable"));
}

#[test]
fn test_disabled_notifications_publish_nothing() {
    let factory = MockProviderFactory::new().with_ec2(volume_with_daily_snapshots("vol-1", 1));

    let sent = run(&factory, false);

    assert!(sent.is_empty());
}

#[test]
fn test_publish_failure_does_not_fail_run() {
    let factory = MockProviderFactory::new()
        .with_ec2(volume_with_daily_snapshots("vol-1", 2))
        .with_publisher(MockPublisher::new().with_failure());

    let sent = run(&factory, true);

    assert!(sent.is_empty());
    assert_eq!(factory.ec2.snapshot_ids("vol-1").len(), 3);
}

#[test]
fn test_tagging_failure_reaches_error_topic() {
    let factory = MockProviderFactory::new()
        .with_ec2(volume_with_daily_snapshots("vol-1", 1).with_failing_tags());

    let sent = run(&factory, true);

    assert_eq!(sent[0].topic, ERR_TOPIC);
    assert!(sent[0].message.starts_with("Error in processing volumes: "));
    assert!(sent[0].message.contains("created but tagging or sharing failed"));
}
