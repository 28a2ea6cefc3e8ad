//! Runtime configuration: an optional TOML file, then environment overrides.
//!
//! The file is looked up in this order and the first one found wins:
//! 1. the path given with `--config` (must exist)
//! 2. `.sentinel/config.toml` in the current directory or any ancestor
//! 3. `{config_dir}/sentinel/config.toml` (e.g. `~/.config/sentinel/config.toml`)
//!
//! Environment variables are applied on top of the file; see [`ENV_VARS`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::savings::DEFAULT_CREDIT_PRICE_USD;

/// A credential. `Debug` and `Serialize` never print the value.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl Serialize for Secret {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub warehouse: WarehouseConfig,
    pub llm: LlmConfig,
    pub notify: NotifyConfig,
    pub savings: SavingsConfig,
    pub history: HistoryConfig,
    /// Per-task schedule overrides, keyed by task name.
    pub schedules: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    /// e.g. `https://myorg-myaccount.snowflakecomputing.com`
    pub account_url: Option<String>,
    pub token: Option<Secret>,
    /// Value of `X-Snowflake-Authorization-Token-Type`.
    pub token_type: String,
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub role: Option<String>,
    /// How far back to look for failed runs.
    pub detection_window_hours: u32,
    /// How far back to average execution times.
    pub stats_window_hours: u32,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            account_url: None,
            token: None,
            token_type: "KEYPAIR_JWT".to_string(),
            warehouse: None,
            database: None,
            schema: None,
            role: None,
            detection_window_hours: 24,
            stats_window_hours: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: Option<Secret>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 1500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub enabled: bool,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub from: Option<String>,
    pub to: Option<String>,
    pub password: Option<Secret>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            smtp_server: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            from: None,
            to: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SavingsConfig {
    pub credit_price_usd: f64,
    /// Used when neither an override nor the warehouse knows a task's schedule.
    pub default_schedule: String,
}

impl Default for SavingsConfig {
    fn default() -> Self {
        Self {
            credit_price_usd: DEFAULT_CREDIT_PRICE_USD,
            default_schedule: "5 MINUTE".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub db_path: Option<PathBuf>,
    /// Number of incidents kept; older ones are pruned on insert.
    pub retention: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            retention: 100,
        }
    }
}

/// Environment variables read by [`Config::apply_env`].
pub const ENV_VARS: &[&str] = &[
    "SNOWFLAKE_ACCOUNT_URL",
    "SNOWFLAKE_TOKEN",
    "SNOWFLAKE_TOKEN_TYPE",
    "SNOWFLAKE_WAREHOUSE",
    "SNOWFLAKE_DATABASE",
    "SNOWFLAKE_SCHEMA",
    "SNOWFLAKE_ROLE",
    "ANTHROPIC_API_KEY",
    "ANTHROPIC_BASE_URL",
    "SENTINEL_LLM_MODEL",
    "SMTP_SERVER",
    "SMTP_PORT",
    "NOTIFICATION_EMAIL_FROM",
    "NOTIFICATION_EMAIL_TO",
    "NOTIFICATION_EMAIL_PASSWORD",
    "SENTINEL_CREDIT_PRICE",
    "SENTINEL_DB_PATH",
    "SENTINEL_HISTORY_RETENTION",
];

fn parse_or_keep<T: std::str::FromStr + Copy>(var: &str, raw: &str, current: T) -> T {
    raw.trim().parse().unwrap_or_else(|_| {
        tracing::warn!("ignoring {var}={raw:?}: not a valid value");
        current
    })
}

impl Config {
    /// Parse a config file's contents.
    ///
    /// # Errors
    /// Returns an error if the TOML is invalid or has wrongly typed fields.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("invalid sentinel config")
    }

    /// Read and parse a config file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Overlay environment values. `lookup` is usually `std::env::var(..).ok()`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let wh = &mut self.warehouse;
        if let Some(v) = lookup("SNOWFLAKE_ACCOUNT_URL") {
            wh.account_url = Some(v);
        }
        if let Some(v) = lookup("SNOWFLAKE_TOKEN") {
            wh.token = Some(Secret(v));
        }
        if let Some(v) = lookup("SNOWFLAKE_TOKEN_TYPE") {
            wh.token_type = v;
        }
        if let Some(v) = lookup("SNOWFLAKE_WAREHOUSE") {
            wh.warehouse = Some(v);
        }
        if let Some(v) = lookup("SNOWFLAKE_DATABASE") {
            wh.database = Some(v);
        }
        if let Some(v) = lookup("SNOWFLAKE_SCHEMA") {
            wh.schema = Some(v);
        }
        if let Some(v) = lookup("SNOWFLAKE_ROLE") {
            wh.role = Some(v);
        }

        if let Some(v) = lookup("ANTHROPIC_API_KEY") {
            self.llm.api_key = Some(Secret(v));
        }
        if let Some(v) = lookup("ANTHROPIC_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = lookup("SENTINEL_LLM_MODEL") {
            self.llm.model = v;
        }

        let notify = &mut self.notify;
        if let Some(v) = lookup("SMTP_SERVER") {
            notify.smtp_server = v;
        }
        if let Some(v) = lookup("SMTP_PORT") {
            notify.smtp_port = parse_or_keep("SMTP_PORT", &v, notify.smtp_port);
        }
        if let Some(v) = lookup("NOTIFICATION_EMAIL_FROM") {
            notify.from = Some(v);
        }
        if let Some(v) = lookup("NOTIFICATION_EMAIL_TO") {
            notify.to = Some(v);
        }
        if let Some(v) = lookup("NOTIFICATION_EMAIL_PASSWORD") {
            notify.password = Some(Secret(v));
        }

        if let Some(v) = lookup("SENTINEL_CREDIT_PRICE") {
            self.savings.credit_price_usd =
                parse_or_keep("SENTINEL_CREDIT_PRICE", &v, self.savings.credit_price_usd);
        }
        if let Some(v) = lookup("SENTINEL_DB_PATH") {
            self.history.db_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("SENTINEL_HISTORY_RETENTION") {
            self.history.retention =
                parse_or_keep("SENTINEL_HISTORY_RETENTION", &v, self.history.retention);
        }
    }

    /// Reject values the rest of the program cannot work with.
    ///
    /// # Errors
    /// Returns an error naming the first invalid field.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.savings.credit_price_usd.is_finite() || self.savings.credit_price_usd < 0.0 {
            anyhow::bail!(
                "savings.credit_price_usd must be a non-negative number, got {}",
                self.savings.credit_price_usd
            );
        }
        if self.history.retention == 0 {
            anyhow::bail!("history.retention must be at least 1");
        }
        if let Some(url) = &self.warehouse.account_url
            && !crate::http::is_secure_url(url)
        {
            anyhow::bail!("warehouse.account_url must use https: {url}");
        }
        Ok(())
    }

    /// Schedule override configured for `task_name`, matched exactly first
    /// and then case-insensitively.
    pub fn schedule_override(&self, task_name: &str) -> Option<&str> {
        self.schedules
            .get(task_name)
            .or_else(|| {
                self.schedules
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(task_name))
                    .map(|(_, schedule)| schedule)
            })
            .map(String::as_str)
    }

    /// Render the effective configuration with secrets masked.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_redacted_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("serialize config")
    }
}

/// Walk up from `dir` looking for `.sentinel/config.toml`.
pub fn find_project_config(dir: &Path) -> Option<PathBuf> {
    let mut current = dir.to_path_buf();
    loop {
        let candidate = current.join(".sentinel").join("config.toml");
        if candidate.is_file() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Pick the config file to use. An explicit path must exist.
///
/// # Errors
/// Returns an error if `explicit` is given but is not a file.
pub fn resolve_config_path(
    explicit: Option<&Path>,
    cwd: &Path,
    global_dir: Option<&Path>,
) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.is_file() {
            anyhow::bail!("config file not found: {}", path.display());
        }
        return Ok(Some(path.to_path_buf()));
    }
    if let Some(found) = find_project_config(cwd) {
        return Ok(Some(found));
    }
    Ok(global_dir
        .map(|d| d.join("sentinel").join("config.toml"))
        .filter(|p| p.is_file()))
}

/// Load the effective configuration from explicit locations and an env lookup.
/// Returns the config and the file it came from, if any.
///
/// # Errors
/// Returns an error if a config file exists but cannot be parsed, or the
/// result fails [`Config::validate`].
pub fn load_from(
    explicit: Option<&Path>,
    cwd: &Path,
    global_dir: Option<&Path>,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<(Config, Option<PathBuf>)> {
    let path = resolve_config_path(explicit, cwd, global_dir)?;
    let mut config = match &path {
        Some(p) => {
            tracing::debug!("loading config from {}", p.display());
            Config::from_file(p)?
        }
        None => Config::default(),
    };
    config.apply_env(lookup);
    config.validate()?;
    Ok((config, path))
}

/// Load the effective configuration for this process.
///
/// # Errors
/// See [`load_from`].
pub fn load(explicit: Option<&Path>) -> anyhow::Result<(Config, Option<PathBuf>)> {
    let cwd = std::env::current_dir().unwrap_or_default();
    let global = dirs::config_dir();
    load_from(explicit, &cwd, global.as_deref(), |k| std::env::var(k).ok())
}

#[cfg(test)]
mod tests;
