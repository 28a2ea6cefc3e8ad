//! Statements run against the account usage views. Values are always bound,
//! never spliced into the SQL text.

use serde::Serialize;

/// A positional bind value (`?` in the statement text).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Text(String),
    Fixed(i64),
}

/// Wire form of one binding in the SQL API request body.
#[derive(Debug, Serialize)]
pub struct BindingValue {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub value: String,
}

impl Binding {
    pub fn to_wire(&self) -> BindingValue {
        match self {
            Self::Text(s) => BindingValue {
                kind: "TEXT",
                value: s.clone(),
            },
            Self::Fixed(n) => BindingValue {
                kind: "FIXED",
                value: n.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: &'static str,
    pub bindings: Vec<Binding>,
}

pub const FAILED_TASKS: &str = "SELECT
    name AS task_name,
    state,
    error_code,
    error_message,
    scheduled_time,
    query_id,
    database_name,
    schema_name
FROM SNOWFLAKE.ACCOUNT_USAGE.TASK_HISTORY
WHERE state = 'FAILED'
    AND scheduled_time > DATEADD('hour', -?, CURRENT_TIMESTAMP())
ORDER BY scheduled_time DESC";

pub const QUERY_DETAILS: &str = "SELECT
    query_text,
    database_name,
    schema_name,
    execution_time,
    error_message
FROM SNOWFLAKE.ACCOUNT_USAGE.QUERY_HISTORY
WHERE query_id = ?";

pub const TABLE_DDL: &str = "SELECT GET_DDL('TABLE', ?) AS ddl";

// Several sizes can show up if the task's warehouse was resized inside the
// window; the one with the most runs is reported.
pub const EXECUTION_STATS: &str = "SELECT
    AVG(qh.execution_time) AS avg_execution_time_ms,
    qh.warehouse_size,
    COUNT(*) AS execution_count
FROM SNOWFLAKE.ACCOUNT_USAGE.TASK_HISTORY th
JOIN SNOWFLAKE.ACCOUNT_USAGE.QUERY_HISTORY qh
    ON th.query_id = qh.query_id
WHERE th.name = ?
    AND th.database_name = ?
    AND th.schema_name = ?
    AND th.scheduled_time > DATEADD('hour', -?, CURRENT_TIMESTAMP())
GROUP BY qh.warehouse_size
ORDER BY execution_count DESC
LIMIT 1";

pub const TASK_SCHEDULE: &str = "SELECT schedule
FROM SNOWFLAKE.ACCOUNT_USAGE.TASK_VERSIONS
WHERE name = ?
    AND database_name = ?
    AND schema_name = ?
ORDER BY graph_version DESC
LIMIT 1";

pub fn failed_tasks(hours_back: u32) -> Statement {
    Statement {
        sql: FAILED_TASKS,
        bindings: vec![Binding::Fixed(i64::from(hours_back))],
    }
}

pub fn query_details(query_id: &str) -> Statement {
    Statement {
        sql: QUERY_DETAILS,
        bindings: vec![Binding::Text(query_id.to_string())],
    }
}

/// `table` is used as-is when already qualified, otherwise prefixed with
/// `database.schema`.
pub fn table_ddl(database: &str, schema: &str, table: &str) -> Statement {
    let qualified = if table.contains('.') {
        table.to_string()
    } else {
        format!("{database}.{schema}.{table}")
    };
    Statement {
        sql: TABLE_DDL,
        bindings: vec![Binding::Text(qualified)],
    }
}

pub fn execution_stats(task: &str, database: &str, schema: &str, hours_back: u32) -> Statement {
    Statement {
        sql: EXECUTION_STATS,
        bindings: vec![
            Binding::Text(task.to_string()),
            Binding::Text(database.to_string()),
            Binding::Text(schema.to_string()),
            Binding::Fixed(i64::from(hours_back)),
        ],
    }
}

pub fn task_schedule(task: &str, database: &str, schema: &str) -> Statement {
    Statement {
        sql: TASK_SCHEDULE,
        bindings: vec![
            Binding::Text(task.to_string()),
            Binding::Text(database.to_string()),
            Binding::Text(schema.to_string()),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placeholders(sql: &str) -> usize {
        sql.matches('?').count()
    }

    #[test]
    fn binding_counts_match_placeholders() {
        for stmt in [
            failed_tasks(24),
            query_details("01b2"),
            table_ddl("DB", "S", "T"),
            execution_stats("T", "DB", "S", 24),
            task_schedule("T", "DB", "S"),
        ] {
            assert_eq!(placeholders(stmt.sql), stmt.bindings.len(), "{}", stmt.sql);
        }
    }

    #[test]
    fn table_ddl_qualifies_bare_names() {
        let stmt = table_ddl("SENTINEL_TEST", "FAILURES", "SALES");
        assert_eq!(
            stmt.bindings,
            vec![Binding::Text("SENTINEL_TEST.FAILURES.SALES".to_string())]
        );
        let stmt = table_ddl("X", "Y", "OTHER.SCHEMA.T");
        assert_eq!(stmt.bindings, vec![Binding::Text("OTHER.SCHEMA.T".to_string())]);
    }

    #[test]
    fn task_names_are_bound_not_interpolated() {
        let stmt = execution_stats("T'; DROP TABLE x; --", "DB", "S", 24);
        assert!(!stmt.sql.contains("DROP"));
    }

    #[test]
    fn wire_binding_types() {
        assert_eq!(Binding::Fixed(24).to_wire().kind, "FIXED");
        assert_eq!(Binding::Fixed(24).to_wire().value, "24");
        assert_eq!(Binding::Text("a".into()).to_wire().kind, "TEXT");
    }
}
