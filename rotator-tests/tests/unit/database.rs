//! Engine passes over the database adapter

use snapshot_rotator::adapters::DatabaseAdapter;
use test_utils::*;

const CLUSTER_ARN: &str = "arn:aws:rds:ap-southeast-2:111122223333:cluster:aurora-1";
const INSTANCE_ARN: &str = "arn:aws:rds:ap-southeast-2:111122223333:db:orders-db";

fn tagged_account() -> MockRdsOps {
    MockRdsOps::new()
        .with_clock(fixed_now())
        .with_cluster("aurora-1", Some(CLUSTER_ARN))
        .with_tags(CLUSTER_ARN, &[DATABASE_TAG, ("Team", "payments")])
        .with_instance("aurora-1-writer", None, Some("aurora-1"))
        .with_instance("orders-db", Some(INSTANCE_ARN), None)
        .with_tags(INSTANCE_ARN, &[DATABASE_TAG, ("aws:rds:managed", "yes")])
}

fn run_database(rds: &MockRdsOps, keep_count: u32, share: Option<&str>) -> RunReport {
    let adapter = DatabaseAdapter::new(rds.clone(), share.map(String::from)).with_clock(fixed_now);
    let run = daily_run(database_filter(), keep_count);
    RetentionEngine::new(&run, EngineOptions::default())
        .with_clock(fixed_now)
        .run(&adapter)
        .expect("enumeration should succeed")
}

#[test]
fn test_clusters_and_standalone_instances_processed() {
    let rds = tagged_account();

    let report = run_database(&rds, 3, None);

    assert_eq!(report.metrics.total_resources, 2);
    assert_eq!(report.metrics.total_creates, 2);

    let calls = rds.recorded_calls();
    assert!(calls.iter().any(|c| matches!(
        c,
        RdsCall::CreateDbClusterSnapshot { cluster_id, .. } if cluster_id == "aurora-1"
    )));
    assert!(calls.iter().any(|c| matches!(
        c,
        RdsCall::CreateDbSnapshot { instance_id, .. } if instance_id == "orders-db"
    )));
    assert!(!calls.iter().any(|c| matches!(
        c,
        RdsCall::CreateDbSnapshot { instance_id, .. } if instance_id == "aurora-1-writer"
    )));
}

#[test]
fn test_snapshot_identifier_and_tags() {
    let rds = tagged_account();

    run_database(&rds, 3, None);

    let created = rds
        .recorded_calls()
        .into_iter()
        .find_map(|c| match c {
            RdsCall::CreateDbSnapshot { snapshot_id, tags, .. } => Some((snapshot_id, tags)),
            _ => None,
        })
        .assert_some();

    assert_eq!(created.0, "day-orders-db-15-01-2025-09-30-00-Wed09");
    assert_eq!(created.1.len(), 1);
    assert_eq!(created.1.get("Environment").map(String::as_str), Some("prod"));
}

#[test]
fn test_rotation_per_cluster() {
    let rds = tagged_account()
        .with_cluster_snapshot("aurora-1", "day-aurora-1-a", Some(days_ago(3)))
        .with_cluster_snapshot("aurora-1", "day-aurora-1-b", Some(days_ago(2)))
        .with_cluster_snapshot("aurora-1", "week-aurora-1-a", Some(days_ago(20)));

    let report = run_database(&rds, 2, None);

    assert_eq!(report.metrics.total_deletes, 1);
    assert!(rds.recorded_calls().contains(&RdsCall::DeleteDbClusterSnapshot {
        snapshot_id: "day-aurora-1-a".to_string()
    }));

    let remaining: Vec<String> = rds
        .cluster_snapshots
        .lock()
        .unwrap()
        .iter()
        .map(|s| s.identifier.clone())
        .collect();
    assert!(remaining.contains(&"week-aurora-1-a".to_string()));
    assert!(remaining.contains(&"day-aurora-1-b".to_string()));
}

#[test]
fn test_pending_snapshot_sorts_newest() {
    // New snapshots report no create time while pending
    let rds = tagged_account()
        .with_pending_creates()
        .with_db_snapshot("orders-db", "day-orders-db-old", Some(days_ago(5)));

    run_database(&rds, 1, None);

    let remaining: Vec<String> = rds
        .db_snapshots
        .lock()
        .unwrap()
        .iter()
        .map(|s| s.identifier.clone())
        .collect();
    assert_eq!(remaining, vec!["day-orders-db-15-01-2025-09-30-00-Wed09"]);
}

#[test]
fn test_snapshots_shared_with_restore_permission() {
    let rds = tagged_account();

    run_database(&rds, 3, Some(SHARE_ACCOUNT));

    assert_eq!(
        rds.shares_for("day-aurora-1-15-01-2025-09-30-00-Wed09"),
        vec![SHARE_ACCOUNT]
    );
    assert_eq!(
        rds.shares_for("day-orders-db-15-01-2025-09-30-00-Wed09"),
        vec![SHARE_ACCOUNT]
    );
}

#[test]
fn test_creation_failure_still_rotates() {
    let rds = tagged_account()
        .with_failing_create("orders-db")
        .with_db_snapshot("orders-db", "day-orders-db-1", Some(days_ago(2)))
        .with_db_snapshot("orders-db", "day-orders-db-2", Some(days_ago(1)));

    let report = run_database(&rds, 1, None);

    assert_eq!(report.metrics.total_errors, 0);
    assert!(rds.recorded_calls().contains(&RdsCall::DeleteDbSnapshot {
        snapshot_id: "day-orders-db-1".to_string()
    }));
}
