use std::path::{Path, PathBuf};

use anyhow::Context as _;

use sentinel::config::Config;
use sentinel::output::{format_num, format_usd, print_json};
use sentinel::savings::schedule::{DEFAULT_ANNUAL_RUNS, names_known_unit};
use sentinel::savings::{self, ExecutionStats, SavingsRequest, credits_per_hour};

#[derive(clap::Args)]
pub struct SavingsArgs {
    /// Average runtime of the task in milliseconds
    #[arg(long, required_unless_present = "no_history")]
    avg_ms: Option<f64>,
    /// Warehouse size label, e.g. "X-Small" or "Medium"
    #[arg(long, required_unless_present = "no_history")]
    warehouse_size: Option<String>,
    /// Schedule such as "5 MINUTE" (default: savings.default_schedule)
    #[arg(long)]
    schedule: Option<String>,
    /// The proposed SQL
    #[arg(long, required_unless_present = "fixed_sql_file", conflicts_with = "fixed_sql_file")]
    fixed_sql: Option<String>,
    /// Read the proposed SQL from a file
    #[arg(long)]
    fixed_sql_file: Option<PathBuf>,
    /// Read the failing SQL from a file
    #[arg(long)]
    original_sql_file: Option<PathBuf>,
    #[arg(long, default_value = "AD_HOC")]
    task_name: String,
    /// Price of one credit in USD (default: savings.credit_price_usd)
    #[arg(long)]
    credit_price: Option<f64>,
    /// The task has no run history; use the placeholder estimate
    #[arg(long, conflicts_with_all = ["avg_ms", "warehouse_size"])]
    no_history: bool,
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

fn read_sql(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("read SQL from {}", path.display()))
}

pub fn cmd_savings(cfg: &Config, args: &SavingsArgs) -> anyhow::Result<i32> {
    let fixed_sql = match (&args.fixed_sql, &args.fixed_sql_file) {
        (Some(sql), _) => sql.clone(),
        (None, Some(path)) => read_sql(path)?,
        (None, None) => anyhow::bail!("one of --fixed-sql or --fixed-sql-file is required"),
    };
    let original_sql = args
        .original_sql_file
        .as_deref()
        .map(read_sql)
        .transpose()?
        .unwrap_or_default();

    let stats = match (args.avg_ms, &args.warehouse_size) {
        (Some(avg), Some(size)) if !args.no_history => {
            if !avg.is_finite() || avg < 0.0 {
                anyhow::bail!("--avg-ms must be a non-negative number, got {avg}");
            }
            Some(ExecutionStats {
                average_execution_time_ms: avg,
                warehouse_size: size.clone(),
                execution_count: 1,
            })
        }
        _ => None,
    };
    let credit_price = args.credit_price.unwrap_or(cfg.savings.credit_price_usd);
    if !credit_price.is_finite() || credit_price < 0.0 {
        anyhow::bail!("--credit-price must be a non-negative number, got {credit_price}");
    }
    let schedule = args
        .schedule
        .as_deref()
        .unwrap_or(&cfg.savings.default_schedule);
    warn_unknown_unit(schedule);

    let report = savings::calculate_savings(&SavingsRequest {
        task_name: &args.task_name,
        stats: stats.as_ref(),
        schedule,
        original_sql: &original_sql,
        fixed_sql: &fixed_sql,
        credit_price,
    })?;

    if args.json {
        print_json(&report);
        return Ok(0);
    }

    let rate = credits_per_hour(&report.warehouse_size);
    println!("Task:                   {}", report.task_name);
    println!(
        "Warehouse size:         {} ({rate} credits/hour)",
        report.warehouse_size
    );
    println!(
        "Average runtime:        {:.2} s",
        report.avg_execution_time_seconds
    );
    println!("Estimated improvement:  {}%", report.estimated_improvement_pct);
    println!(
        "Time saved per run:     {:.2} s",
        report.time_saved_per_run_seconds
    );
    println!("Credits saved per run:  {:.6}", report.credits_saved_per_run);
    println!(
        "Runs per year:          {}",
        format_num(i64::try_from(report.executions_per_year).unwrap_or(i64::MAX))
    );
    println!("Annual credits saved:   {:.6}", report.annual_credits_saved);
    println!(
        "Annual savings:         {}",
        format_usd(report.annual_cost_saved_usd)
    );
    if report.speculative {
        eprintln!("[sentinel] no run history given, estimate uses a 10 s X-Small placeholder");
    }
    Ok(0)
}

fn warn_unknown_unit(schedule: &str) {
    if !names_known_unit(schedule) {
        eprintln!(
            "[sentinel] warning: no MINUTE/HOUR/DAY unit in {schedule:?}, assuming {DEFAULT_ANNUAL_RUNS} runs per year"
        );
    }
}

pub fn cmd_runs(schedule: &str) -> anyhow::Result<i32> {
    warn_unknown_unit(schedule);
    let runs = savings::annual_runs(schedule)?;
    println!("{runs}");
    Ok(0)
}
