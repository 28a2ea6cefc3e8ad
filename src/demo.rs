//! Offline fixtures: a warehouse with three failing tasks and a diagnoser with
//! canned answers, so a full scan can run without credentials.

use crate::diagnosis::{Diagnoser, Diagnosis, FailureContext};
use crate::savings::ExecutionStats;
use crate::warehouse::{QueryDetails, TaskFailure, Warehouse};

const DATABASE: &str = "SENTINEL_TEST";
const SCHEMA: &str = "FAILURES";
const SCHEDULE: &str = "5 MINUTE";

const SALES_DDL: &str = "create or replace TABLE SALES (
\tORDER_ID NUMBER(38,0),
\tREVENUE NUMBER(10,2),
\tORDERS NUMBER(38,0),
\tREGION VARCHAR(50)
);";

struct Fixture {
    task_name: &'static str,
    query_id: &'static str,
    error_code: &'static str,
    error_message: &'static str,
    query_text: &'static str,
    execution_time_ms: f64,
    answer: &'static str,
}

static FIXTURES: [Fixture; 3] = [
    Fixture {
        task_name: "TASK_BROKEN_DIVISION",
        query_id: "01b8d3a1-0000-4f2e-0000-000000000001",
        error_code: "100051",
        error_message: "Division by zero",
        query_text: "SELECT
    order_id,
    revenue / orders AS avg_per_order
FROM sales",
        execution_time_ms: 152.0,
        answer: "STEP 1 - ANALYZE ERROR
The query failed with \"Division by zero\": a divisor evaluated to zero for at least one row.

STEP 2 - CONTEXT CHECK
avg_per_order is computed as revenue / orders. ORDERS is NUMBER(38,0) and nothing prevents it from being zero.

STEP 3 - ROOT CAUSE IDENTIFICATION
Some rows of SALES have orders = 0 and the expression has no guard for them.

STEP 4 - PROPOSE FIX
```sql
SELECT
    order_id,
    -- guard against division by zero
    CASE
        WHEN orders = 0 THEN 0
        ELSE revenue / orders
    END AS avg_per_order
FROM sales;
```
The CASE expression checks the denominator before dividing.

STEP 5 - VALIDATION
Rows with zero orders now yield 0 instead of aborting the task. NULLIF(orders, 0) is an alternative if NULL is preferred.",
    },
    Fixture {
        task_name: "TASK_MISSING_COLUMN",
        query_id: "01b8d3a1-0000-4f2e-0000-000000000002",
        error_code: "000904",
        error_message: "SQL compilation error: error line 3 at position 4 invalid identifier 'NONEXISTENT_COLUMN'",
        query_text: "SELECT
    order_id,
    nonexistent_column
FROM sales",
        execution_time_ms: 0.0,
        answer: "STEP 1 - ANALYZE ERROR
Compilation failed because the identifier NONEXISTENT_COLUMN does not resolve to any column.

STEP 2 - CONTEXT CHECK
SALES has ORDER_ID, REVENUE, ORDERS and REGION. There is no NONEXISTENT_COLUMN.

STEP 3 - ROOT CAUSE IDENTIFICATION
The query references a column that is not part of the table, most likely a typo or a stale reference after a schema change.

STEP 4 - PROPOSE FIX
```sql
SELECT
    order_id,
    revenue  -- missing column replaced with an existing one
FROM sales;
```

STEP 5 - VALIDATION
Every selected column now exists, so the statement compiles. The error surfaced at compile time, so no data was scanned.",
    },
    Fixture {
        task_name: "TASK_MISSING_TABLE",
        query_id: "01b8d3a1-0000-4f2e-0000-000000000003",
        error_code: "002003",
        error_message: "SQL compilation error: Object 'FAKE_TABLE_THAT_DOES_NOT_EXIST' does not exist or not authorized.",
        query_text: "SELECT * FROM fake_table_that_does_not_exist",
        execution_time_ms: 0.0,
        answer: "STEP 1 - ANALYZE ERROR
The object FAKE_TABLE_THAT_DOES_NOT_EXIST could not be found, or the role cannot see it.

STEP 2 - CONTEXT CHECK
The task reads every column of a table that does not exist in SENTINEL_TEST.FAILURES.

STEP 3 - ROOT CAUSE IDENTIFICATION
A missing dependency: the table was renamed, dropped, lives in another schema, or was never created.

STEP 4 - PROPOSE FIX
```sql
SELECT * FROM sales;  -- missing table replaced with the intended source
```

STEP 5 - VALIDATION
The statement now references an existing table. Creating dependencies before the task is scheduled prevents a repeat.",
    },
];

fn fixture_by_task(task_name: &str) -> Option<&'static Fixture> {
    FIXTURES.iter().find(|f| f.task_name == task_name)
}

fn failure(fixture: &Fixture, scheduled_time: &str) -> TaskFailure {
    TaskFailure {
        task_name: fixture.task_name.to_string(),
        state: "FAILED".to_string(),
        error_code: Some(fixture.error_code.to_string()),
        error_message: fixture.error_message.to_string(),
        scheduled_time: scheduled_time.to_string(),
        query_id: Some(fixture.query_id.to_string()),
        database_name: DATABASE.to_string(),
        schema_name: SCHEMA.to_string(),
    }
}

/// A warehouse whose history holds only the bundled failures.
#[derive(Debug, Default)]
pub struct DemoWarehouse;

impl Warehouse for DemoWarehouse {
    fn failed_tasks(&self, _hours_back: u32) -> anyhow::Result<Vec<TaskFailure>> {
        let [division, column, table] = &FIXTURES;
        Ok(vec![
            failure(division, "2025-01-15 10:05:00.000 -0800"),
            failure(column, "2025-01-15 10:05:00.000 -0800"),
            failure(table, "2025-01-15 10:05:00.000 -0800"),
            failure(division, "2025-01-15 10:00:00.000 -0800"),
        ])
    }

    fn query_details(&self, query_id: &str) -> anyhow::Result<Option<QueryDetails>> {
        Ok(FIXTURES
            .iter()
            .find(|f| f.query_id == query_id)
            .map(|f| QueryDetails {
                query_text: f.query_text.to_string(),
                database: Some(DATABASE.to_string()),
                schema: Some(SCHEMA.to_string()),
                execution_time_ms: Some(f.execution_time_ms),
                error_message: Some(f.error_message.to_string()),
            }))
    }

    fn table_ddl(
        &self,
        _database: &str,
        _schema: &str,
        table: &str,
    ) -> anyhow::Result<Option<String>> {
        let name = table.rsplit('.').next().unwrap_or(table);
        Ok(name
            .eq_ignore_ascii_case("SALES")
            .then(|| SALES_DDL.to_string()))
    }

    fn execution_stats(
        &self,
        task: &TaskFailure,
        _hours_back: u32,
    ) -> anyhow::Result<Option<ExecutionStats>> {
        Ok(fixture_by_task(&task.task_name).map(|f| ExecutionStats {
            average_execution_time_ms: f.execution_time_ms,
            warehouse_size: "X-Small".to_string(),
            execution_count: 288,
        }))
    }

    fn task_schedule(&self, task: &TaskFailure) -> anyhow::Result<Option<String>> {
        Ok(fixture_by_task(&task.task_name).map(|_| SCHEDULE.to_string()))
    }
}

/// Answers with the canned analysis of whichever bundled query it is shown.
#[derive(Debug, Default)]
pub struct DemoDiagnoser;

impl Diagnoser for DemoDiagnoser {
    fn diagnose(&self, context: &FailureContext) -> anyhow::Result<Diagnosis> {
        let fixture = FIXTURES
            .iter()
            .find(|f| f.query_text == context.query_text)
            .ok_or_else(|| anyhow::anyhow!("no canned diagnosis for this query"))?;
        Ok(Diagnosis::from_response(fixture.answer))
    }
}
