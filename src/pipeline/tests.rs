#![allow(clippy::unwrap_used, clippy::float_cmp)]

use std::cell::RefCell;
use std::collections::HashMap;

use super::*;
use crate::demo::{DemoDiagnoser, DemoWarehouse};
use crate::diagnosis::Diagnosis;
use crate::notify::{Email, NotifyError, RecordingNotifier};
use crate::savings::ExecutionStats;
use crate::warehouse::QueryDetails;

// --- fakes ---

#[derive(Default)]
struct FakeWarehouse {
    failures: Vec<TaskFailure>,
    queries: HashMap<String, String>,
    ddl_fails: bool,
    stats: Option<ExecutionStats>,
    stats_fail: bool,
    schedule: Option<String>,
    ddl_requests: RefCell<Vec<(String, String, String)>>,
}

impl Warehouse for FakeWarehouse {
    fn failed_tasks(&self, _hours_back: u32) -> anyhow::Result<Vec<TaskFailure>> {
        Ok(self.failures.clone())
    }

    fn query_details(&self, query_id: &str) -> anyhow::Result<Option<QueryDetails>> {
        Ok(self.queries.get(query_id).map(|sql| QueryDetails {
            query_text: sql.clone(),
            database: None,
            schema: None,
            execution_time_ms: Some(1.0),
            error_message: None,
        }))
    }

    fn table_ddl(&self, db: &str, schema: &str, table: &str) -> anyhow::Result<Option<String>> {
        self.ddl_requests
            .borrow_mut()
            .push((db.to_string(), schema.to_string(), table.to_string()));
        if self.ddl_fails {
            anyhow::bail!("insufficient privileges");
        }
        Ok(Some(format!("create table {table} (x int)")))
    }

    fn execution_stats(
        &self,
        _task: &TaskFailure,
        _hours_back: u32,
    ) -> anyhow::Result<Option<ExecutionStats>> {
        if self.stats_fail {
            anyhow::bail!("account usage unavailable");
        }
        Ok(self.stats.clone())
    }

    fn task_schedule(&self, _task: &TaskFailure) -> anyhow::Result<Option<String>> {
        Ok(self.schedule.clone())
    }
}

struct FixedDiagnoser(&'static str);

impl Diagnoser for FixedDiagnoser {
    fn diagnose(&self, _context: &FailureContext) -> anyhow::Result<Diagnosis> {
        Ok(Diagnosis::from_response(self.0))
    }
}

struct DownDiagnoser;

impl Diagnoser for DownDiagnoser {
    fn diagnose(&self, _context: &FailureContext) -> anyhow::Result<Diagnosis> {
        anyhow::bail!("LLM API returned 529")
    }
}

struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn send(&self, _email: &Email) -> Result<(), NotifyError> {
        Err(NotifyError::NotConfigured("NOTIFICATION_EMAIL_TO"))
    }
}

fn failure(task: &str, query_id: Option<&str>) -> TaskFailure {
    TaskFailure {
        task_name: task.to_string(),
        state: "FAILED".to_string(),
        error_code: None,
        error_message: "boom".to_string(),
        scheduled_time: "2025-01-02 10:00:00".to_string(),
        query_id: query_id.map(ToString::to_string),
        database_name: "DB".to_string(),
        schema_name: "SC".to_string(),
    }
}

fn warehouse_with(task: &str, sql: &str) -> FakeWarehouse {
    FakeWarehouse {
        failures: vec![failure(task, Some("q1"))],
        queries: HashMap::from([("q1".to_string(), sql.to_string())]),
        stats: Some(ExecutionStats {
            average_execution_time_ms: 3_600_000.0,
            warehouse_size: "X-Small".to_string(),
            execution_count: 24,
        }),
        ..FakeWarehouse::default()
    }
}

const PARTITION_FIX: &str = "STEP 4 - PROPOSE FIX\n```sql\nSELECT * FROM t -- partition pruning\n```";

fn options() -> ScanOptions {
    ScanOptions {
        hours_back: 24,
        notify_each: true,
        summary: false,
    }
}

// --- investigate ---

#[test]
fn investigate_collects_ddl_and_diagnosis() {
    let wh = warehouse_with("T", "SELECT a FROM db.sc.t");
    let inv = investigate(&wh, &FixedDiagnoser(PARTITION_FIX), &wh.failures[0]).unwrap();
    assert_eq!(inv.query_text, "SELECT a FROM db.sc.t");
    assert_eq!(inv.table_ddl.as_deref(), Some("create table DB.SC.T (x int)"));
    assert_eq!(inv.fixed_sql(), Some("SELECT * FROM t -- partition pruning"));
    let requests = wh.ddl_requests.borrow();
    assert_eq!(requests[0], ("DB".to_string(), "SC".to_string(), "DB.SC.T".to_string()));
}

#[test]
fn investigate_without_query_details_fails() {
    let wh = warehouse_with("T", "SELECT 1 FROM t");
    let err = investigate(&wh, &DownDiagnoser, &failure("T", Some("missing"))).unwrap_err();
    assert!(err.to_string().contains("could not fetch query details for missing"));
}

#[test]
fn investigate_without_query_id_fails() {
    let wh = warehouse_with("T", "SELECT 1 FROM t");
    let err = investigate(&wh, &DownDiagnoser, &failure("T", None)).unwrap_err();
    assert!(err.to_string().contains("no query id"));
}

#[test]
fn ddl_error_degrades_to_none() {
    let wh = FakeWarehouse {
        ddl_fails: true,
        ..warehouse_with("T", "SELECT a FROM t")
    };
    let inv = investigate(&wh, &FixedDiagnoser(PARTITION_FIX), &wh.failures[0]).unwrap();
    assert_eq!(inv.table_ddl, None);
    assert!(inv.diagnosis.is_some());
}

#[test]
fn query_without_table_skips_ddl_lookup() {
    let wh = warehouse_with("T", "SELECT 1");
    let inv = investigate(&wh, &FixedDiagnoser(PARTITION_FIX), &wh.failures[0]).unwrap();
    assert_eq!(inv.table_ddl, None);
    assert!(wh.ddl_requests.borrow().is_empty());
}

#[test]
fn unreachable_model_leaves_diagnosis_empty() {
    let wh = warehouse_with("T", "SELECT a FROM t");
    let inv = investigate(&wh, &DownDiagnoser, &wh.failures[0]).unwrap();
    assert_eq!(inv.diagnosis, None);
    assert_eq!(inv.fixed_sql(), None);
}

// --- schedule resolution ---

#[test]
fn schedule_override_beats_warehouse() {
    let wh = FakeWarehouse {
        schedule: Some("60 MINUTE".to_string()),
        ..warehouse_with("T", "SELECT 1")
    };
    let mut config = Config::default();
    config.schedules.insert("t".to_string(), "1 DAY".to_string());
    let sentinel = Sentinel {
        warehouse: &wh,
        diagnoser: &DownDiagnoser,
        notifier: None,
        config: &config,
    };
    assert_eq!(sentinel.resolve_schedule(&wh.failures[0]), "1 DAY");
}

#[test]
fn schedule_falls_back_to_warehouse_then_default() {
    let config = Config::default();
    let with_schedule = FakeWarehouse {
        schedule: Some("60 MINUTE".to_string()),
        ..warehouse_with("T", "SELECT 1")
    };
    let sentinel = Sentinel {
        warehouse: &with_schedule,
        diagnoser: &DownDiagnoser,
        notifier: None,
        config: &config,
    };
    assert_eq!(sentinel.resolve_schedule(&with_schedule.failures[0]), "60 MINUTE");

    let without = warehouse_with("T", "SELECT 1");
    let sentinel = Sentinel {
        warehouse: &without,
        ..sentinel
    };
    assert_eq!(sentinel.resolve_schedule(&without.failures[0]), "5 MINUTE");
}

// --- run ---

#[test]
fn run_prices_the_fix_and_notifies() {
    let wh = FakeWarehouse {
        schedule: Some("1 DAY".to_string()),
        ..warehouse_with("T", "SELECT * FROM t")
    };
    let notifier = RecordingNotifier::default();
    let config = Config::default();
    let sentinel = Sentinel {
        warehouse: &wh,
        diagnoser: &FixedDiagnoser(PARTITION_FIX),
        notifier: Some(&notifier),
        config: &config,
    };
    let outcome = sentinel.run(&options()).unwrap();

    assert_eq!(outcome.incidents.len(), 1);
    let savings = &outcome.incidents[0].savings;
    // one hour on X-Small, 40% faster, once a day
    assert_eq!(savings.estimated_improvement_pct, 40);
    assert_eq!(savings.executions_per_year, 365);
    assert_eq!(savings.annual_credits_saved, 146.0);
    assert_eq!(savings.annual_cost_saved_usd, 438.0);
    assert!(!savings.speculative);
    assert_eq!(outcome.incidents[0].schedule, "1 DAY");

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "[Sentinel] Fix Proposed: T");
    assert_eq!(outcome.notifications_sent, 1);
}

#[test]
fn missing_fix_prices_the_original_sql() {
    let wh = warehouse_with("T", "SELECT COALESCE(a, 0) FROM t");
    let config = Config::default();
    let sentinel = Sentinel {
        warehouse: &wh,
        diagnoser: &DownDiagnoser,
        notifier: None,
        config: &config,
    };
    let outcome = sentinel.run(&options()).unwrap();
    assert_eq!(outcome.incidents[0].savings.estimated_improvement_pct, 5);
    assert_eq!(outcome.notifications_sent, 0);
}

#[test]
fn missing_stats_are_speculative() {
    let wh = FakeWarehouse {
        stats: None,
        ..warehouse_with("T", "SELECT 1")
    };
    let config = Config::default();
    let sentinel = Sentinel {
        warehouse: &wh,
        diagnoser: &DownDiagnoser,
        notifier: None,
        config: &config,
    };
    let outcome = sentinel.run(&options()).unwrap();
    let savings = &outcome.incidents[0].savings;
    assert!(savings.speculative);
    assert_eq!(savings.avg_execution_time_seconds, 10.0);
    assert_eq!(outcome.summary().speculative_count, 1);
}

#[test]
fn stats_error_is_treated_as_missing() {
    let wh = FakeWarehouse {
        stats_fail: true,
        ..warehouse_with("T", "SELECT 1")
    };
    let config = Config::default();
    let sentinel = Sentinel {
        warehouse: &wh,
        diagnoser: &DownDiagnoser,
        notifier: None,
        config: &config,
    };
    let outcome = sentinel.run(&options()).unwrap();
    assert!(outcome.incidents[0].savings.speculative);
}

#[test]
fn malformed_schedule_skips_the_task() {
    let wh = FakeWarehouse {
        schedule: Some("MINUTE".to_string()),
        ..warehouse_with("T", "SELECT 1")
    };
    let config = Config::default();
    let sentinel = Sentinel {
        warehouse: &wh,
        diagnoser: &DownDiagnoser,
        notifier: None,
        config: &config,
    };
    let outcome = sentinel.run(&options()).unwrap();
    assert!(outcome.incidents.is_empty());
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].task_name, "T");
}

#[test]
fn notification_failures_are_counted_not_fatal() {
    let wh = warehouse_with("T", "SELECT 1");
    let config = Config::default();
    let sentinel = Sentinel {
        warehouse: &wh,
        diagnoser: &DownDiagnoser,
        notifier: Some(&FailingNotifier),
        config: &config,
    };
    let outcome = sentinel
        .run(&ScanOptions {
            summary: true,
            ..options()
        })
        .unwrap();
    assert_eq!(outcome.incidents.len(), 1);
    assert_eq!(outcome.notifications_sent, 0);
    assert_eq!(outcome.notification_failures, 2);
}

#[test]
fn demo_scan_end_to_end() {
    let notifier = RecordingNotifier::default();
    let config = Config::default();
    let sentinel = Sentinel {
        warehouse: &DemoWarehouse,
        diagnoser: &DemoDiagnoser,
        notifier: Some(&notifier),
        config: &config,
    };
    let outcome = sentinel
        .run(&ScanOptions {
            hours_back: 24,
            notify_each: false,
            summary: true,
        })
        .unwrap();

    let names: Vec<&str> = outcome.incidents.iter().map(Incident::task_name).collect();
    assert_eq!(
        names,
        ["TASK_BROKEN_DIVISION", "TASK_MISSING_COLUMN", "TASK_MISSING_TABLE"]
    );
    let division = &outcome.incidents[0];
    assert!(division.investigation.table_ddl.is_some());
    assert_eq!(division.savings.estimated_improvement_pct, 5);
    assert_eq!(division.savings.executions_per_year, 105_120);
    assert_eq!(division.savings.annual_cost_saved_usd, 0.67);
    assert_eq!(outcome.incidents[1].savings.estimated_improvement_pct, 100);
    assert_eq!(outcome.incidents[1].savings.annual_cost_saved_usd, 0.0);
    assert_eq!(outcome.incidents[2].investigation.table_ddl, None);

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "[Sentinel] Daily Summary: 3 Tasks Need Attention");
    assert_eq!(outcome.summary().total_annual_savings_usd, 0.67);
}

#[test]
fn listing_error_aborts_the_scan() {
    struct Offline;
    impl Warehouse for Offline {
        fn failed_tasks(&self, _h: u32) -> anyhow::Result<Vec<TaskFailure>> {
            anyhow::bail!("could not reach warehouse")
        }
        fn query_details(&self, _q: &str) -> anyhow::Result<Option<QueryDetails>> {
            Ok(None)
        }
        fn table_ddl(&self, _d: &str, _s: &str, _t: &str) -> anyhow::Result<Option<String>> {
            Ok(None)
        }
        fn execution_stats(
            &self,
            _t: &TaskFailure,
            _h: u32,
        ) -> anyhow::Result<Option<ExecutionStats>> {
            Ok(None)
        }
        fn task_schedule(&self, _t: &TaskFailure) -> anyhow::Result<Option<String>> {
            Ok(None)
        }
    }
    let config = Config::default();
    let sentinel = Sentinel {
        warehouse: &Offline,
        diagnoser: &DownDiagnoser,
        notifier: None,
        config: &config,
    };
    assert!(sentinel.run(&options()).is_err());
}
