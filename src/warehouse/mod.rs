//! Warehouse telemetry: which tasks failed, what they ran, how long they take.

pub mod snowflake;
pub mod sql;

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::savings::ExecutionStats;

/// One failed run of a scheduled task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub task_name: String,
    pub state: String,
    pub error_code: Option<String>,
    pub error_message: String,
    pub scheduled_time: String,
    pub query_id: Option<String>,
    pub database_name: String,
    pub schema_name: String,
}

/// What a failed run actually executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDetails {
    pub query_text: String,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub execution_time_ms: Option<f64>,
    pub error_message: Option<String>,
}

/// Read-only access to the warehouse's task and query history.
pub trait Warehouse {
    /// Failed task runs scheduled in the last `hours_back` hours, newest first.
    ///
    /// # Errors
    /// Returns an error if the history cannot be queried.
    fn failed_tasks(&self, hours_back: u32) -> anyhow::Result<Vec<TaskFailure>>;

    /// # Errors
    /// Returns an error if the history cannot be queried.
    fn query_details(&self, query_id: &str) -> anyhow::Result<Option<QueryDetails>>;

    /// DDL of `table`, which may already be qualified.
    ///
    /// # Errors
    /// Returns an error if the lookup itself fails; a missing table is `None`.
    fn table_ddl(&self, database: &str, schema: &str, table: &str)
    -> anyhow::Result<Option<String>>;

    /// Average runtime of `task` over the last `hours_back` hours; `None` when
    /// it has no runs in the window.
    ///
    /// # Errors
    /// Returns an error if the history cannot be queried.
    fn execution_stats(
        &self,
        task: &TaskFailure,
        hours_back: u32,
    ) -> anyhow::Result<Option<ExecutionStats>>;

    /// The task's current schedule definition, e.g. `5 MINUTE`.
    ///
    /// # Errors
    /// Returns an error if the task metadata cannot be queried.
    fn task_schedule(&self, task: &TaskFailure) -> anyhow::Result<Option<String>>;
}

/// Keep only the most recent failure of each task, ordered by task name.
///
/// `failures` must be newest first, as [`Warehouse::failed_tasks`] returns them.
pub fn latest_failure_per_task(failures: Vec<TaskFailure>) -> Vec<TaskFailure> {
    let mut latest: BTreeMap<String, TaskFailure> = BTreeMap::new();
    for failure in failures {
        latest.entry(failure.task_name.clone()).or_insert(failure);
    }
    latest.into_values().collect()
}

static FROM_TABLE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?i)\bFROM\s+([A-Za-z0-9_$."]+)"#).ok());

/// The first table a query reads from, upper-cased, or `None` if there is no
/// `FROM` clause.
pub fn referenced_table(sql: &str) -> Option<String> {
    let re = FROM_TABLE.as_ref()?;
    let caps = re.captures(sql)?;
    let table = caps
        .get(1)?
        .as_str()
        .trim_end_matches([';', ')', ','])
        .replace('"', "")
        .to_uppercase();
    (!table.is_empty()).then_some(table)
}
