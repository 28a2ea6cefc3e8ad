#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::collections::HashMap;

use super::*;
use tempfile::TempDir;

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |k| map.get(k).cloned()
}

fn no_env(_: &str) -> Option<String> {
    None
}

// --- defaults and parsing ---

#[test]
fn defaults() {
    let cfg = Config::default();
    assert_eq!(cfg.savings.credit_price_usd, 3.0);
    assert_eq!(cfg.savings.default_schedule, "5 MINUTE");
    assert_eq!(cfg.warehouse.detection_window_hours, 24);
    assert_eq!(cfg.warehouse.token_type, "KEYPAIR_JWT");
    assert_eq!(cfg.llm.max_tokens, 1500);
    assert_eq!(cfg.notify.smtp_port, 587);
    assert_eq!(cfg.history.retention, 100);
    assert!(cfg.schedules.is_empty());
}

#[test]
fn parse_partial_file_keeps_other_defaults() {
    let cfg = Config::parse(
        r#"
[warehouse]
account_url = "https://acme.snowflakecomputing.com"
database = "SENTINEL_TEST"

[savings]
credit_price_usd = 2.5

[schedules]
TASK_HOURLY_ROLLUP = "1 HOUR"
"#,
    )
    .unwrap();
    assert_eq!(
        cfg.warehouse.account_url.as_deref(),
        Some("https://acme.snowflakecomputing.com")
    );
    assert_eq!(cfg.warehouse.database.as_deref(), Some("SENTINEL_TEST"));
    assert_eq!(cfg.warehouse.stats_window_hours, 24);
    assert_eq!(cfg.savings.credit_price_usd, 2.5);
    assert_eq!(cfg.savings.default_schedule, "5 MINUTE");
    assert_eq!(cfg.schedule_override("TASK_HOURLY_ROLLUP"), Some("1 HOUR"));
}

#[test]
fn parse_rejects_wrong_types() {
    let err = Config::parse("[savings]\ncredit_price_usd = \"cheap\"").unwrap_err();
    assert!(format!("{err:#}").contains("invalid sentinel config"));
}

#[test]
fn schedule_override_is_case_insensitive_fallback() {
    let cfg = Config::parse("[schedules]\ntask_nightly = \"1 DAY\"").unwrap();
    assert_eq!(cfg.schedule_override("TASK_NIGHTLY"), Some("1 DAY"));
    assert_eq!(cfg.schedule_override("TASK_OTHER"), None);
}

// --- environment overlay ---

#[test]
fn env_overrides_file_values() {
    let mut cfg = Config::parse("[notify]\nsmtp_server = \"mail.internal\"").unwrap();
    cfg.apply_env(env_of(&[
        ("SMTP_SERVER", "smtp.example.com"),
        ("SMTP_PORT", "2525"),
        ("SNOWFLAKE_TOKEN", "jwt-token"),
        ("ANTHROPIC_API_KEY", "sk-test"),
        ("SENTINEL_CREDIT_PRICE", "4.25"),
        ("SENTINEL_DB_PATH", "/tmp/incidents.db"),
    ]));
    assert_eq!(cfg.notify.smtp_server, "smtp.example.com");
    assert_eq!(cfg.notify.smtp_port, 2525);
    assert_eq!(cfg.warehouse.token.as_ref().unwrap().expose(), "jwt-token");
    assert_eq!(cfg.llm.api_key.as_ref().unwrap().expose(), "sk-test");
    assert_eq!(cfg.savings.credit_price_usd, 4.25);
    assert_eq!(
        cfg.history.db_path.as_deref(),
        Some(Path::new("/tmp/incidents.db"))
    );
}

#[test]
fn unparseable_env_number_keeps_previous_value() {
    let mut cfg = Config::default();
    cfg.apply_env(env_of(&[
        ("SMTP_PORT", "not-a-port"),
        ("SENTINEL_HISTORY_RETENTION", "-3"),
    ]));
    assert_eq!(cfg.notify.smtp_port, 587);
    assert_eq!(cfg.history.retention, 100);
}

// --- validation ---

#[test]
fn negative_credit_price_is_rejected() {
    let mut cfg = Config::default();
    cfg.savings.credit_price_usd = -1.0;
    assert!(cfg.validate().is_err());
}

#[test]
fn zero_retention_is_rejected() {
    let mut cfg = Config::default();
    cfg.history.retention = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn plain_http_account_url_is_rejected() {
    let mut cfg = Config::default();
    cfg.warehouse.account_url = Some("http://acme.snowflakecomputing.com".to_string());
    let err = cfg.validate().unwrap_err().to_string();
    assert!(err.contains("https"), "{err}");
}

// --- secrets ---

#[test]
fn secrets_are_redacted_in_debug_and_toml() {
    let mut cfg = Config::default();
    cfg.apply_env(env_of(&[
        ("SNOWFLAKE_TOKEN", "super-secret-jwt"),
        ("NOTIFICATION_EMAIL_PASSWORD", "hunter2"),
    ]));
    let debug = format!("{cfg:?}");
    assert!(!debug.contains("super-secret-jwt"));
    assert!(!debug.contains("hunter2"));

    let rendered = cfg.to_redacted_toml().unwrap();
    assert!(!rendered.contains("super-secret-jwt"));
    assert!(!rendered.contains("hunter2"));
    assert!(rendered.contains("[REDACTED]"));
}

// --- file resolution ---

#[test]
fn explicit_path_must_exist() {
    let dir = TempDir::new().expect("tempdir");
    let missing = dir.path().join("nope.toml");
    let err = resolve_config_path(Some(&missing), dir.path(), None).unwrap_err();
    assert!(err.to_string().contains("config file not found"));
}

#[test]
fn project_config_found_from_subdirectory() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::create_dir_all(dir.path().join(".sentinel")).unwrap();
    std::fs::write(
        dir.path().join(".sentinel/config.toml"),
        "[savings]\ncredit_price_usd = 1.5",
    )
    .unwrap();
    let nested = dir.path().join("a/b");
    std::fs::create_dir_all(&nested).unwrap();

    let (cfg, path) = load_from(None, &nested, None, no_env).unwrap();
    assert_eq!(cfg.savings.credit_price_usd, 1.5);
    assert_eq!(path, Some(dir.path().join(".sentinel/config.toml")));
}

#[test]
fn project_config_beats_global() {
    let project = TempDir::new().expect("tempdir");
    let global = TempDir::new().expect("tempdir");
    std::fs::create_dir_all(project.path().join(".sentinel")).unwrap();
    std::fs::write(
        project.path().join(".sentinel/config.toml"),
        "[history]\nretention = 5",
    )
    .unwrap();
    std::fs::create_dir_all(global.path().join("sentinel")).unwrap();
    std::fs::write(
        global.path().join("sentinel/config.toml"),
        "[history]\nretention = 50",
    )
    .unwrap();

    let (cfg, _) = load_from(None, project.path(), Some(global.path()), no_env).unwrap();
    assert_eq!(cfg.history.retention, 5);
}

#[test]
fn global_config_used_when_no_project_config() {
    let project = TempDir::new().expect("tempdir");
    let global = TempDir::new().expect("tempdir");
    std::fs::create_dir_all(global.path().join("sentinel")).unwrap();
    std::fs::write(
        global.path().join("sentinel/config.toml"),
        "[history]\nretention = 50",
    )
    .unwrap();

    let (cfg, path) = load_from(None, project.path(), Some(global.path()), no_env).unwrap();
    assert_eq!(cfg.history.retention, 50);
    assert_eq!(path, Some(global.path().join("sentinel/config.toml")));
}

#[test]
fn no_files_gives_defaults_plus_env() {
    let project = TempDir::new().expect("tempdir");
    let (cfg, path) = load_from(
        None,
        project.path(),
        None,
        env_of(&[("SENTINEL_LLM_MODEL", "claude-test")]),
    )
    .unwrap();
    assert!(path.is_none());
    assert_eq!(cfg.llm.model, "claude-test");
}

#[test]
fn invalid_env_result_fails_validation() {
    let project = TempDir::new().expect("tempdir");
    let result = load_from(
        None,
        project.path(),
        None,
        env_of(&[("SENTINEL_CREDIT_PRICE", "-2")]),
    );
    assert!(result.is_err());
}
