//! Heuristic estimate of what fixing a failed task saves per year.

pub mod credits;
pub mod improvement;
pub mod schedule;

use serde::{Deserialize, Serialize};

pub use credits::credits_per_hour;
pub use improvement::estimate_improvement_percent;
pub use schedule::{MalformedScheduleError, annual_runs};

/// Price of one warehouse credit when none is configured.
pub const DEFAULT_CREDIT_PRICE_USD: f64 = 3.0;

/// Aggregated run history of one task over a trailing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub average_execution_time_ms: f64,
    pub warehouse_size: String,
    pub execution_count: u64,
}

impl ExecutionStats {
    /// Stand-in used when a task has no history in the window:
    /// ten seconds on an X-Small warehouse, one run.
    pub fn placeholder() -> Self {
        Self {
            average_execution_time_ms: 10_000.0,
            warehouse_size: credits::SMALLEST_WAREHOUSE.to_string(),
            execution_count: 1,
        }
    }
}

/// Everything [`calculate_savings`] needs for one task.
#[derive(Debug, Clone)]
pub struct SavingsRequest<'a> {
    pub task_name: &'a str,
    /// `None` when the task has no recorded history.
    pub stats: Option<&'a ExecutionStats>,
    pub schedule: &'a str,
    pub original_sql: &'a str,
    pub fixed_sql: &'a str,
    pub credit_price: f64,
}

/// Estimated savings of one fix. Numbers are rounded for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingsReport {
    pub task_name: String,
    pub warehouse_size: String,
    pub avg_execution_time_seconds: f64,
    pub estimated_improvement_pct: u32,
    pub time_saved_per_run_seconds: f64,
    pub credits_saved_per_run: f64,
    pub executions_per_year: u64,
    pub annual_credits_saved: f64,
    pub annual_cost_saved_usd: f64,
    /// Set when no run history existed and placeholder stats were used.
    #[serde(default)]
    pub speculative: bool,
}

/// Round `value` to `places` decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Estimate the annual savings of replacing a task's SQL with a fix.
///
/// All arithmetic runs at full precision; only the reported fields are
/// rounded (seconds to 2 places, credits to 6, currency to 2).
///
/// # Errors
///
/// Returns [`MalformedScheduleError`] if the schedule names a unit without a
/// usable interval.
pub fn calculate_savings(req: &SavingsRequest<'_>) -> Result<SavingsReport, MalformedScheduleError> {
    let placeholder;
    let (stats, speculative) = if let Some(stats) = req.stats {
        (stats, false)
    } else {
        placeholder = ExecutionStats::placeholder();
        (&placeholder, true)
    };

    let avg_seconds = stats.average_execution_time_ms / 1000.0;
    let rate = credits_per_hour(&stats.warehouse_size);
    let runs = annual_runs(req.schedule)?;
    let pct = estimate_improvement_percent(req.original_sql, req.fixed_sql);

    let time_saved = avg_seconds * f64::from(pct) / 100.0;
    let credits_before = avg_seconds / 3600.0 * rate;
    let credits_after = (avg_seconds - time_saved) / 3600.0 * rate;
    let credits_saved_per_run = credits_before - credits_after;

    #[allow(clippy::cast_precision_loss)]
    let annual_credits = credits_saved_per_run * runs as f64;
    let annual_cost = annual_credits * req.credit_price;

    Ok(SavingsReport {
        task_name: req.task_name.to_string(),
        warehouse_size: stats.warehouse_size.clone(),
        avg_execution_time_seconds: round_to(avg_seconds, 2),
        estimated_improvement_pct: pct,
        time_saved_per_run_seconds: round_to(time_saved, 2),
        credits_saved_per_run: round_to(credits_saved_per_run, 6),
        executions_per_year: runs,
        annual_credits_saved: round_to(annual_credits, 6),
        annual_cost_saved_usd: round_to(annual_cost, 2),
        speculative,
    })
}
