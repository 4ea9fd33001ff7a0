//! Config file, event loading and plan resolution

use serial_test::serial;
use snapshot_rotator::config::{
    load_config, load_event, parse_event, resolve_plan, resolve_share_account, ConfigError,
    EXT_ACCOUNT_ENV,
};
use test_utils::*;

#[test]
fn test_persisted_config_round_trips() {
    let (config, _dir, path) = ConfigBuilder::new()
        .share_account(SHARE_ACCOUNT)
        .creation_failure(CreationFailurePolicy::Error)
        .endpoint_url("http://localhost:4566")
        .notifications(false)
        .persist();

    let loaded = load_config(&path).assert_ok();
    assert_eq!(loaded.global.share_account, config.global.share_account);
    assert_eq!(loaded.global.creation_failure, CreationFailurePolicy::Error);
    assert_eq!(loaded.global.endpoint_url.as_deref(), Some("http://localhost:4566"));
    assert!(!loaded.notifications.enabled);
}

#[test]
fn test_invalid_toml_rejected() {
    let ctx = TestContext::new();
    let path = ctx.create_file("config.toml", "invalid { toml content");
    assert!(matches!(load_config(&path), Err(ConfigError::ParseError(_))));
}

#[test]
fn test_non_numeric_share_account_rejected() {
    let ctx = TestContext::new();
    let path = ctx.create_file("config.toml", "[global]\nshare_account = \"prod-account\"\n");
    load_config(&path).assert_err_contains("share_account");
}

#[test]
fn test_event_file_loads_and_resolves() {
    let ctx = TestContext::new();
    let path = ctx.write_event(
        EventBuilder::daily()
            .ec2_tag(VOLUME_TAG.0, VOLUME_TAG.1)
            .keep(12)
            .success_topic("arn:aws:sns:ap-southeast-2:123456789012:ok"),
    );

    let payload = load_event(Some(path.as_path())).assert_ok();
    let event = parse_event(&payload).assert_ok();
    let plan = resolve_plan(&event, fixed_now()).assert_ok();

    assert_eq!(plan.date_suffix, "Wed09");
    assert_eq!(plan.keep_count, 12);
    assert_eq!(plan.volume_filter, Some(volume_filter()));
    assert!(plan.database_filter.is_none());
    assert!(plan.error_topic.is_none());
}

#[test]
fn test_event_must_be_object() {
    let ctx = TestContext::new();
    let path = ctx.create_file("event.json", "[1, 2, 3]");
    load_event(Some(path.as_path())).assert_err_contains("JSON object");
}

#[test]
fn test_missing_required_field() {
    let payload = EventBuilder::daily().without("region_name").build();
    parse_event(&payload).assert_err_contains("region_name");
}

#[test]
fn test_negative_keep_count_rejected() {
    let payload = EventBuilder::daily().field("keep_count", serde_json::json!(-1)).build();
    assert!(parse_event(&payload).is_err());
}

#[test]
fn test_weekly_suffix() {
    let event = parse_event(&EventBuilder::weekly().build()).assert_ok();
    let plan = resolve_plan(&event, fixed_now()).assert_ok();
    assert_eq!(plan.date_suffix, "02");
}

#[test]
fn test_half_configured_pair_disables_type() {
    let payload = EventBuilder::daily()
        .field("rds_tag_name", serde_json::json!("Environment"))
        .build();
    let plan = resolve_plan(&parse_event(&payload).assert_ok(), fixed_now()).assert_ok();
    assert!(plan.is_noop());
}

#[test]
#[serial]
fn test_share_account_from_environment() {
    std::env::set_var(EXT_ACCOUNT_ENV, "777788889999");
    let account = resolve_share_account(&GlobalConfig::default());
    std::env::remove_var(EXT_ACCOUNT_ENV);

    assert_eq!(account.as_deref(), Some("777788889999"));
}

#[test]
#[serial]
fn test_config_share_account_wins_over_environment() {
    std::env::set_var(EXT_ACCOUNT_ENV, "777788889999");
    let global = GlobalConfig {
        share_account: Some(SHARE_ACCOUNT.to_string()),
        ..GlobalConfig::default()
    };
    let account = resolve_share_account(&global);
    std::env::remove_var(EXT_ACCOUNT_ENV);

    assert_eq!(account.as_deref(), Some(SHARE_ACCOUNT));
}

#[test]
#[serial]
fn test_empty_environment_account_means_no_sharing() {
    std::env::set_var(EXT_ACCOUNT_ENV, "");
    let account = resolve_share_account(&GlobalConfig::default());
    std::env::remove_var(EXT_ACCOUNT_ENV);

    account.assert_none();
}
