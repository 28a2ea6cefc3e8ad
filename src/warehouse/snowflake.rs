//! Client for the Snowflake SQL REST API (`/api/v2/statements`).

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;

use super::sql::{self, BindingValue, Statement};
use super::{QueryDetails, TaskFailure, Warehouse};
use crate::config::{Secret, WarehouseConfig};
use crate::http::{self, retry::with_retry};
use crate::savings::ExecutionStats;
use crate::savings::credits::SMALLEST_WAREHOUSE;

/// Server-side statement timeout sent with every request.
const STATEMENT_TIMEOUT_SECS: u64 = 60;
/// How many times to poll a statement that is still running.
const MAX_POLLS: u32 = 30;
const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct ColumnType {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartitionInfo {
    #[serde(default)]
    row_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    row_type: Vec<ColumnType>,
    /// Partition 0 arrives inline; the rest are fetched by index.
    #[serde(default)]
    partition_info: Vec<PartitionInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
    statement_handle: Option<String>,
}

/// Rows of a finished statement. Every value arrives as an optional string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

/// One row, addressed by column name.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [String],
    values: &'a [Option<String>],
}

impl<'a> Row<'a> {
    /// Value of `column` (case-insensitive); `None` for SQL NULL or an
    /// unknown column.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let idx = self
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))?;
        self.values.get(idx)?.as_deref()
    }

    fn get_f64(&self, column: &str) -> Option<f64> {
        self.get(column)?.trim().parse().ok()
    }
}

impl ResultSet {
    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(|values| Row {
            columns: &self.columns,
            values,
        })
    }

    pub fn first(&self) -> Option<Row<'_>> {
        self.rows().next()
    }
}

pub struct SnowflakeClient {
    http: reqwest::blocking::Client,
    base_url: String,
    token: Secret,
    token_type: String,
    context: BTreeMap<&'static str, String>,
}

impl SnowflakeClient {
    /// # Errors
    /// Returns an error if the account URL or token is missing, or the HTTP
    /// client cannot be built.
    pub fn from_config(cfg: &WarehouseConfig) -> anyhow::Result<Self> {
        let base_url = cfg.account_url.clone().ok_or_else(|| {
            anyhow::anyhow!("warehouse account URL not configured (SNOWFLAKE_ACCOUNT_URL)")
        })?;
        let token = cfg
            .token
            .clone()
            .ok_or_else(|| anyhow::anyhow!("warehouse token not configured (SNOWFLAKE_TOKEN)"))?;
        let client = http::build_client(http::WAREHOUSE_TIMEOUT_SECS)?;
        let mut this = Self::new(client, &base_url, token, &cfg.token_type);
        for (key, value) in [
            ("warehouse", &cfg.warehouse),
            ("database", &cfg.database),
            ("schema", &cfg.schema),
            ("role", &cfg.role),
        ] {
            if let Some(v) = value {
                this.context.insert(key, v.clone());
            }
        }
        Ok(this)
    }

    pub fn new(
        http: reqwest::blocking::Client,
        base_url: &str,
        token: Secret,
        token_type: &str,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            token_type: token_type.to_string(),
            context: BTreeMap::new(),
        }
    }

    fn request_body(&self, stmt: &Statement) -> serde_json::Value {
        let bindings: BTreeMap<String, BindingValue> = stmt
            .bindings
            .iter()
            .enumerate()
            .map(|(i, b)| ((i + 1).to_string(), b.to_wire()))
            .collect();
        let mut body = serde_json::json!({
            "statement": stmt.sql,
            "timeout": STATEMENT_TIMEOUT_SECS,
        });
        if let Some(obj) = body.as_object_mut() {
            for (key, value) in &self.context {
                obj.insert((*key).to_string(), serde_json::Value::String(value.clone()));
            }
            if !bindings.is_empty() {
                obj.insert("bindings".to_string(), serde_json::json!(bindings));
            }
        }
        body
    }

    fn authed(
        &self,
        builder: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        builder
            .bearer_auth(self.token.expose())
            .header("X-Snowflake-Authorization-Token-Type", &self.token_type)
            .header("Accept", "application/json")
    }

    fn send(&self, builder: reqwest::blocking::RequestBuilder) -> anyhow::Result<StatementResponse> {
        let url = self.base_url.as_str();
        let resp = builder
            .send()
            .map_err(|e| anyhow::anyhow!("could not reach warehouse at {url}: {e}"))?;
        let resp = http::require_success(resp, "warehouse", "SNOWFLAKE_TOKEN")?;
        resp.json::<StatementResponse>()
            .map_err(|e| anyhow::anyhow!("invalid response from warehouse: {e}"))
    }

    /// Run one statement, wait for its result and collect every partition.
    ///
    /// # Errors
    /// Returns an error if the request fails, the statement is rejected, it
    /// is still running after the polling budget, or a partition cannot be
    /// fetched.
    pub fn execute(&self, stmt: &Statement) -> anyhow::Result<ResultSet> {
        let url = format!("{}/api/v2/statements", self.base_url);
        let body = self.request_body(stmt);
        let mut resp = with_retry("warehouse statement", || {
            self.send(self.authed(self.http.post(&url)).json(&body))
        })?;

        let mut handle = resp.statement_handle.take();
        let mut polls = 0;
        let meta = loop {
            if let Some(meta) = resp.result_set_meta_data.take() {
                break meta;
            }
            let Some(h) = handle.clone() else {
                anyhow::bail!("warehouse response had neither results nor a statement handle");
            };
            if polls >= MAX_POLLS {
                anyhow::bail!("statement {h} still running after {MAX_POLLS} polls");
            }
            polls += 1;
            tracing::debug!(handle = %h, polls, "statement still running");
            std::thread::sleep(POLL_INTERVAL);
            let poll_url = format!("{url}/{h}");
            resp = with_retry("warehouse poll", || {
                self.send(self.authed(self.http.get(&poll_url)))
            })?;
            if let Some(h) = resp.statement_handle.take() {
                handle = Some(h);
            }
        };

        let mut rows = resp.data;
        for (index, partition) in meta.partition_info.iter().enumerate().skip(1) {
            let Some(h) = handle.as_deref() else {
                anyhow::bail!(
                    "result has {} partitions but no statement handle",
                    meta.partition_info.len()
                );
            };
            let part_url = format!("{url}/{h}");
            let part = with_retry("warehouse partition", || {
                self.send(
                    self.authed(self.http.get(&part_url))
                        .query(&[("partition", index)]),
                )
            })
            .with_context(|| format!("fetch partition {index} of statement {h}"))?;
            tracing::debug!(
                handle = %h,
                index,
                expected = partition.row_count,
                received = part.data.len(),
                "fetched result partition"
            );
            rows.extend(part.data);
        }

        Ok(ResultSet {
            columns: meta.row_type.into_iter().map(|c| c.name).collect(),
            rows,
        })
    }
}

fn failure_from_row(row: Row<'_>) -> Option<TaskFailure> {
    let text = |col: &str| row.get(col).unwrap_or_default().to_string();
    let task_name = row.get("TASK_NAME")?.to_string();
    Some(TaskFailure {
        task_name,
        state: text("STATE"),
        error_code: row.get("ERROR_CODE").map(ToString::to_string),
        error_message: text("ERROR_MESSAGE"),
        scheduled_time: text("SCHEDULED_TIME"),
        query_id: row.get("QUERY_ID").map(ToString::to_string),
        database_name: text("DATABASE_NAME"),
        schema_name: text("SCHEMA_NAME"),
    })
}

impl Warehouse for SnowflakeClient {
    fn failed_tasks(&self, hours_back: u32) -> anyhow::Result<Vec<TaskFailure>> {
        let rs = self
            .execute(&sql::failed_tasks(hours_back))
            .context("query failed tasks")?;
        let failures: Vec<TaskFailure> = rs.rows().filter_map(failure_from_row).collect();
        tracing::info!(count = failures.len(), hours_back, "detected failed task runs");
        Ok(failures)
    }

    fn query_details(&self, query_id: &str) -> anyhow::Result<Option<QueryDetails>> {
        let rs = self
            .execute(&sql::query_details(query_id))
            .with_context(|| format!("query details of {query_id}"))?;
        Ok(rs.first().and_then(|row| {
            Some(QueryDetails {
                query_text: row.get("QUERY_TEXT")?.to_string(),
                database: row.get("DATABASE_NAME").map(ToString::to_string),
                schema: row.get("SCHEMA_NAME").map(ToString::to_string),
                execution_time_ms: row.get_f64("EXECUTION_TIME"),
                error_message: row.get("ERROR_MESSAGE").map(ToString::to_string),
            })
        }))
    }

    fn table_ddl(
        &self,
        database: &str,
        schema: &str,
        table: &str,
    ) -> anyhow::Result<Option<String>> {
        let rs = self
            .execute(&sql::table_ddl(database, schema, table))
            .with_context(|| format!("fetch DDL of {table}"))?;
        Ok(rs
            .first()
            .and_then(|row| row.get("DDL"))
            .map(ToString::to_string))
    }

    fn execution_stats(
        &self,
        task: &TaskFailure,
        hours_back: u32,
    ) -> anyhow::Result<Option<ExecutionStats>> {
        let stmt = sql::execution_stats(
            &task.task_name,
            &task.database_name,
            &task.schema_name,
            hours_back,
        );
        let rs = self
            .execute(&stmt)
            .with_context(|| format!("execution stats of {}", task.task_name))?;
        Ok(rs.first().and_then(|row| {
            let avg = row.get_f64("AVG_EXECUTION_TIME_MS")?;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let count = row.get_f64("EXECUTION_COUNT").unwrap_or(0.0).max(0.0) as u64;
            Some(ExecutionStats {
                average_execution_time_ms: avg.max(0.0),
                warehouse_size: row
                    .get("WAREHOUSE_SIZE")
                    .unwrap_or(SMALLEST_WAREHOUSE)
                    .to_string(),
                execution_count: count,
            })
        }))
    }

    fn task_schedule(&self, task: &TaskFailure) -> anyhow::Result<Option<String>> {
        let stmt = sql::task_schedule(&task.task_name, &task.database_name, &task.schema_name);
        let rs = self
            .execute(&stmt)
            .with_context(|| format!("schedule of {}", task.task_name))?;
        Ok(rs
            .first()
            .and_then(|row| row.get("SCHEDULE"))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string))
    }
}
