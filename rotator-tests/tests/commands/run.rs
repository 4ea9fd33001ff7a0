//! Tests for the 'run' flow
//!
//! Event in, enriched output out, with every provider mocked.

use serde_json::json;
use snapshot_rotator::adapters::ResourceKind;
use snapshot_rotator::managers::coordinator::{RunCoordinator, RunSettings, METRICS_KEY};
use test_utils::*;

fn settings() -> RunSettings {
    RunSettings {
        notifications_enabled: true,
        ..Default::default()
    }
}

fn execute(factory: &MockProviderFactory, event: serde_json::Value) -> snapshot_rotator::CoordinatorOutcome {
    RunCoordinator::new(factory.clone(), settings())
        .with_clock(fixed_now)
        .execute(event)
        .assert_ok()
}

#[test]
fn test_noop_event_echoed_without_provider_calls() {
    let factory = MockProviderFactory::new();
    let event = EventBuilder::daily()
        .success_topic("arn:aws:sns:ap-southeast-2:123456789012:ok")
        .field("source", json!("aws.events"))
        .build();

    let outcome = execute(&factory, event.clone());

    assert_eq!(outcome.output, event);
    assert!(outcome.output.get(METRICS_KEY).is_none());
    assert_eq!(factory.clients_built(), 0);
    assert!(factory.ec2.recorded_calls().is_empty());
}

#[test]
fn test_noop_event_with_unusable_date_format_is_echoed() {
    let factory = MockProviderFactory::new();
    let event = EventBuilder::new("day", "%Q").build();

    let outcome = execute(&factory, event.clone());

    assert_eq!(outcome.output, event);
    assert_eq!(factory.clients_built(), 0);
}

#[test]
fn test_bad_date_format_rejected_when_a_run_is_configured() {
    let factory = MockProviderFactory::new().with_ec2(volume_with_daily_snapshots("vol-1", 1));
    let event = EventBuilder::new("day", "%Q")
        .ec2_tag(VOLUME_TAG.0, VOLUME_TAG.1)
        .build();

    RunCoordinator::new(factory.clone(), settings())
        .with_clock(fixed_now)
        .execute(event)
        .assert_err_contains("Invalid invocation event");
    assert_eq!(factory.clients_built(), 0);
}

#[test]
fn test_volume_rotation_output() {
    let factory = MockProviderFactory::new().with_ec2(volume_with_daily_snapshots("vol-1", 4));
    let event = EventBuilder::daily()
        .ec2_tag(VOLUME_TAG.0, VOLUME_TAG.1)
        .keep(3)
        .field("source", json!("aws.events"))
        .build();

    let outcome = execute(&factory, event);
    let output = &outcome.output;

    assert!(outcome.is_success());
    assert_eq!(output["source"], "aws.events");
    assert_eq!(
        output[METRICS_KEY],
        json!({
            "total_resources": 1,
            "total_creates": 1,
            "total_errors": 0,
            "total_deletes": 2
        })
    );

    let transcript = output["ec2_backup_result"].as_str().assert_some();
    assert!(transcript.starts_with("Started taking day snapshots at 15-01-2025 09:30:00"));
    assert!(transcript.contains("Processing backup item vol-1"));
    assert!(transcript.contains("Current backups in rotation (keeping 3)"));
    assert!(transcript.contains("Total snapshots deleted: 2"));

    assert_eq!(factory.ec2.deleted_ids(), vec!["snap-d4", "snap-d3"]);
}

#[test]
fn test_both_types_sum_metrics() {
    let rds = MockRdsOps::new()
        .with_clock(fixed_now())
        .with_instance("orders-db", Some("arn:aws:rds:ap-southeast-2:1:db:orders-db"), None)
        .with_tags("arn:aws:rds:ap-southeast-2:1:db:orders-db", &[DATABASE_TAG])
        .with_db_snapshot("orders-db", "day-orders-db-old", Some(days_ago(3)));
    let factory = MockProviderFactory::new()
        .with_ec2(volume_with_daily_snapshots("vol-1", 2))
        .with_rds(rds);

    let event = EventBuilder::daily()
        .ec2_tag(VOLUME_TAG.0, VOLUME_TAG.1)
        .rds_tag(DATABASE_TAG.0, DATABASE_TAG.1)
        .keep(1)
        .build();

    let outcome = execute(&factory, event);

    // Volume: 2 old + 1 new, keep 1. Database: 1 old + 1 new, keep 1.
    assert_eq!(outcome.output[METRICS_KEY]["total_resources"], 2);
    assert_eq!(outcome.output[METRICS_KEY]["total_creates"], 2);
    assert_eq!(outcome.output[METRICS_KEY]["total_deletes"], 3);
    assert!(outcome.output["ec2_backup_result"].is_string());
    assert!(outcome.output["rds_backup_result"].is_string());
}

#[test]
fn test_failed_type_does_not_stop_the_other() {
    let factory = MockProviderFactory::new()
        .with_ec2(volume_with_daily_snapshots("vol-1", 1))
        .with_failing_rds();

    let event = EventBuilder::daily()
        .ec2_tag(VOLUME_TAG.0, VOLUME_TAG.1)
        .rds_tag(DATABASE_TAG.0, DATABASE_TAG.1)
        .build();

    let outcome = execute(&factory, event);

    assert!(!outcome.is_success());
    assert_eq!(outcome.failures, vec![ResourceKind::Database]);
    assert!(outcome.output["ec2_backup_result"].is_string());
    assert!(outcome.output["rds_backup_error"]
        .as_str()
        .assert_some()
        .contains("Mock RDS client unavailable"));
    assert_eq!(outcome.output[METRICS_KEY]["total_resources"], 1);
}

#[test]
fn test_enumeration_failure_recorded() {
    let factory = MockProviderFactory::new()
        .with_ec2(MockEc2Ops::new().with_failing_describe_volumes());

    let event = EventBuilder::daily().ec2_tag(VOLUME_TAG.0, VOLUME_TAG.1).build();
    let outcome = execute(&factory, event);

    assert_eq!(outcome.failures, vec![ResourceKind::Volume]);
    assert!(outcome.output["ec2_backup_error"]
        .as_str()
        .assert_some()
        .contains("Failed to enumerate volume resources"));
    assert_eq!(outcome.output[METRICS_KEY]["total_resources"], 0);
}

#[test]
fn test_dry_run_reports_plan_only() {
    let factory = MockProviderFactory::new().with_ec2(volume_with_daily_snapshots("vol-1", 5));
    let event = EventBuilder::daily()
        .ec2_tag(VOLUME_TAG.0, VOLUME_TAG.1)
        .keep(2)
        .success_topic("arn:aws:sns:ap-southeast-2:123456789012:ok")
        .build();

    let mut settings = settings();
    settings.engine.dry_run = true;

    let outcome = RunCoordinator::new(factory.clone(), settings)
        .with_clock(fixed_now)
        .execute(event)
        .assert_ok();

    assert_eq!(outcome.output[METRICS_KEY]["total_deletes"], 3);
    assert!(outcome.output["ec2_backup_result"]
        .as_str()
        .assert_some()
        .contains("[DRY RUN] Would delete snapshot"));
    assert_eq!(factory.ec2.snapshot_ids("vol-1").len(), 5);
    assert!(factory.publisher.messages().is_empty());
}

#[test]
fn test_share_account_reaches_adapters() {
    let factory = MockProviderFactory::new().with_ec2(volume_with_daily_snapshots("vol-1", 0));
    let event = EventBuilder::daily().ec2_tag(VOLUME_TAG.0, VOLUME_TAG.1).build();

    let settings = RunSettings {
        share_account: Some(SHARE_ACCOUNT.to_string()),
        ..settings()
    };
    RunCoordinator::new(factory.clone(), settings)
        .with_clock(fixed_now)
        .execute(event)
        .assert_ok();

    let created = factory.ec2.snapshot_ids("vol-1");
    assert_eq!(factory.ec2.shares_for(&created[0]), vec![SHARE_ACCOUNT]);
}
