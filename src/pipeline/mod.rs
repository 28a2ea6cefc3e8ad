//! One scan: detect failed tasks, investigate each, price the fix, and notify.

use chrono::Local;
use serde::Serialize;

use crate::config::Config;
use crate::diagnosis::{Diagnoser, FailureContext};
use crate::incident::{ExecutiveSummary, Incident, Investigation};
use crate::notify::{self, Notifier};
use crate::savings::{self, SavingsRequest, schedule::names_known_unit};
use crate::warehouse::{self, TaskFailure, Warehouse};

/// Gather the query, table DDL, and a diagnosis for one failure.
///
/// A missing DDL or an unreachable model degrades the investigation instead of
/// failing it.
///
/// # Errors
/// Returns an error if the failure has no query id or its query details
/// cannot be fetched.
pub fn investigate(
    warehouse: &dyn Warehouse,
    diagnoser: &dyn Diagnoser,
    failure: &TaskFailure,
) -> anyhow::Result<Investigation> {
    let Some(query_id) = failure.query_id.as_deref() else {
        anyhow::bail!("failed run of {} has no query id", failure.task_name);
    };
    let details = warehouse
        .query_details(query_id)?
        .ok_or_else(|| anyhow::anyhow!("could not fetch query details for {query_id}"))?;

    let table_ddl = warehouse::referenced_table(&details.query_text).and_then(|table| {
        let database = details.database.as_deref().unwrap_or(&failure.database_name);
        let schema = details.schema.as_deref().unwrap_or(&failure.schema_name);
        match warehouse.table_ddl(database, schema, &table) {
            Ok(ddl) => ddl,
            Err(e) => {
                tracing::warn!(table = %table, "could not fetch DDL: {e:#}");
                None
            }
        }
    });

    let context = FailureContext {
        query_text: details.query_text.clone(),
        error_message: failure.error_message.clone(),
        table_ddl: table_ddl.clone(),
    };
    let diagnosis = match diagnoser.diagnose(&context) {
        Ok(d) => Some(d),
        Err(e) => {
            tracing::warn!(task = %failure.task_name, "diagnosis unavailable: {e:#}");
            None
        }
    };

    Ok(Investigation {
        task_name: failure.task_name.clone(),
        query_text: details.query_text,
        error_message: failure.error_message.clone(),
        table_ddl,
        diagnosis,
        execution_time_ms: details.execution_time_ms,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    pub hours_back: u32,
    /// Send one fix proposal per incident.
    pub notify_each: bool,
    /// Send one summary covering all incidents.
    pub summary: bool,
}

/// A failure that could not be turned into an incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skipped {
    pub task_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanOutcome {
    pub incidents: Vec<Incident>,
    pub skipped: Vec<Skipped>,
    pub notifications_sent: usize,
    pub notification_failures: usize,
}

impl ScanOutcome {
    pub fn summary(&self) -> ExecutiveSummary {
        ExecutiveSummary::from_reports(self.incidents.iter().map(|i| &i.savings))
    }
}

/// Wires a warehouse, a diagnoser, and an optional notifier together.
pub struct Sentinel<'a> {
    pub warehouse: &'a dyn Warehouse,
    pub diagnoser: &'a dyn Diagnoser,
    pub notifier: Option<&'a dyn Notifier>,
    pub config: &'a Config,
}

impl Sentinel<'_> {
    /// Schedule used to price `failure`: a configured override, else the
    /// task's own definition, else the configured default.
    pub fn resolve_schedule(&self, failure: &TaskFailure) -> String {
        if let Some(s) = self.config.schedule_override(&failure.task_name) {
            return s.to_string();
        }
        match self.warehouse.task_schedule(failure) {
            Ok(Some(s)) => return s,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(task = %failure.task_name, "could not read schedule: {e:#}");
            }
        }
        self.config.savings.default_schedule.clone()
    }

    fn build_incident(&self, failure: TaskFailure) -> anyhow::Result<Incident> {
        let investigation = investigate(self.warehouse, self.diagnoser, &failure)?;
        let schedule = self.resolve_schedule(&failure);
        if !names_known_unit(&schedule) {
            tracing::warn!(
                task = %failure.task_name,
                schedule = %schedule,
                "schedule has no MINUTE/HOUR/DAY unit, assuming one run per day"
            );
        }

        let stats = match self
            .warehouse
            .execution_stats(&failure, self.config.warehouse.stats_window_hours)
        {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(task = %failure.task_name, "no execution stats: {e:#}");
                None
            }
        };
        let fixed_sql = investigation
            .fixed_sql()
            .unwrap_or(investigation.query_text.as_str());
        let savings = savings::calculate_savings(&SavingsRequest {
            task_name: &failure.task_name,
            stats: stats.as_ref(),
            schedule: &schedule,
            original_sql: &investigation.query_text,
            fixed_sql,
            credit_price: self.config.savings.credit_price_usd,
        })?;

        Ok(Incident {
            failure,
            investigation,
            schedule,
            savings,
        })
    }

    fn deliver(&self, email: &notify::Email, outcome: &mut ScanOutcome) {
        let Some(notifier) = self.notifier else {
            return;
        };
        match notifier.send(email) {
            Ok(()) => outcome.notifications_sent += 1,
            Err(e) => {
                tracing::warn!(subject = %email.subject, "notification failed: {e}");
                outcome.notification_failures += 1;
            }
        }
    }

    /// Run one full scan.
    ///
    /// # Errors
    /// Returns an error only if the failed tasks cannot be listed; per-task
    /// problems are collected in [`ScanOutcome::skipped`].
    pub fn run(&self, options: &ScanOptions) -> anyhow::Result<ScanOutcome> {
        let failures = warehouse::latest_failure_per_task(
            self.warehouse.failed_tasks(options.hours_back)?,
        );
        tracing::info!(tasks = failures.len(), "investigating failed tasks");

        let mut outcome = ScanOutcome::default();
        for failure in failures {
            let task_name = failure.task_name.clone();
            match self.build_incident(failure) {
                Ok(incident) => {
                    if options.notify_each {
                        let email = notify::compose_fix_proposal(&incident, &Local::now());
                        self.deliver(&email, &mut outcome);
                    }
                    outcome.incidents.push(incident);
                }
                Err(e) => {
                    tracing::warn!(task = %task_name, "skipped: {e:#}");
                    outcome.skipped.push(Skipped {
                        task_name,
                        reason: format!("{e:#}"),
                    });
                }
            }
        }

        if options.summary && !outcome.incidents.is_empty() {
            let email = notify::compose_summary(&outcome.incidents, &Local::now());
            self.deliver(&email, &mut outcome);
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests;
