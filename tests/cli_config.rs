#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::process::{Command, Output};

use tempfile::TempDir;

fn command(home: &TempDir) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_sentinel"));
    for var in sentinel::config::ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .env_remove("SENTINEL_LOG");
    cmd
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

#[test]
fn show_defaults_without_a_file() {
    let home = TempDir::new().unwrap();
    let out = command(&home).args(["config", "show"]).output().unwrap();
    assert!(out.status.success(), "{}", stderr(&out));
    assert!(stderr(&out).contains("no config file found"));
    let shown: toml::Value = toml::from_str(&stdout(&out)).unwrap();
    assert_eq!(shown["savings"]["credit_price_usd"].as_float(), Some(3.0));
    assert_eq!(shown["savings"]["default_schedule"].as_str(), Some("5 MINUTE"));
}

#[test]
fn show_redacts_secrets_from_file_and_env() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("sentinel.toml");
    std::fs::write(
        &path,
        r#"
[warehouse]
account_url = "https://acct.snowflakecomputing.com"
token = "file-token-value"

[schedules]
TASK_NIGHTLY = "1 DAY"
"#,
    )
    .unwrap();

    let out = command(&home)
        .env("ANTHROPIC_API_KEY", "sk-env-secret")
        .args(["config", "show", "--config", path.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", stderr(&out));
    let text = stdout(&out);
    assert!(!text.contains("file-token-value"), "{text}");
    assert!(!text.contains("sk-env-secret"), "{text}");
    assert!(text.contains("[REDACTED]"), "{text}");
    assert!(text.contains("TASK_NIGHTLY"), "{text}");
    assert!(stderr(&out).contains("sentinel.toml"));
}

#[test]
fn project_config_is_discovered_from_subdirectory() {
    let home = TempDir::new().unwrap();
    std::fs::create_dir_all(home.path().join(".sentinel")).unwrap();
    std::fs::write(
        home.path().join(".sentinel/config.toml"),
        "[savings]\ncredit_price_usd = 4.5\n",
    )
    .unwrap();
    let nested = home.path().join("a/b");
    std::fs::create_dir_all(&nested).unwrap();

    let out = command(&home)
        .current_dir(&nested)
        .args(["config", "show"])
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", stderr(&out));
    let shown: toml::Value = toml::from_str(&stdout(&out)).unwrap();
    assert_eq!(shown["savings"]["credit_price_usd"].as_float(), Some(4.5));
}

#[test]
fn missing_explicit_config_is_an_error() {
    let home = TempDir::new().unwrap();
    let out = command(&home)
        .args(["config", "show", "--config", "does-not-exist.toml"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("config file not found"));
}

#[test]
fn insecure_account_url_is_rejected() {
    let home = TempDir::new().unwrap();
    let out = command(&home)
        .env("SNOWFLAKE_ACCOUNT_URL", "http://acct.example.com")
        .args(["runs", "1 DAY"])
        .output()
        .unwrap();
    // `runs` needs no config
    assert!(out.status.success());

    let out = command(&home)
        .env("SNOWFLAKE_ACCOUNT_URL", "http://acct.example.com")
        .args(["history", "summary"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("must use https"), "{}", stderr(&out));
}
