use serde::Serialize;

use sentinel::config::Config;
use sentinel::demo::{DemoDiagnoser, DemoWarehouse};
use sentinel::diagnosis::Diagnoser;
use sentinel::diagnosis::anthropic::AnthropicClient;
use sentinel::history;
use sentinel::incident::{ExecutiveSummary, Incident};
use sentinel::notify::smtp::SmtpNotifier;
use sentinel::notify::{DryRunNotifier, Email, Notifier, RecordingNotifier};
use sentinel::output::{format_num, format_usd, print_json, truncate_chars};
use sentinel::pipeline::{ScanOptions, Sentinel, Skipped};
use sentinel::warehouse::snowflake::SnowflakeClient;
use sentinel::warehouse::{self, Warehouse};

#[derive(clap::Args)]
#[allow(clippy::struct_excessive_bools)]
pub struct ScanArgs {
    /// Look back this many hours (default: warehouse.detection_window_hours)
    #[arg(long)]
    hours: Option<u32>,
    /// Use the bundled offline fixtures (implies --dry-run)
    #[arg(long)]
    demo: bool,
    /// Print emails instead of sending them
    #[arg(long)]
    dry_run: bool,
    /// Do not send a fix proposal per incident
    #[arg(long)]
    no_notify: bool,
    /// Also send one summary email for the whole scan
    #[arg(long)]
    summary: bool,
    /// Do not store incidents in the history DB
    #[arg(long)]
    no_record: bool,
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

fn connect(cfg: &Config, demo: bool) -> anyhow::Result<(Box<dyn Warehouse>, Box<dyn Diagnoser>)> {
    if demo {
        return Ok((Box::new(DemoWarehouse), Box::new(DemoDiagnoser)));
    }
    let warehouse = SnowflakeClient::from_config(&cfg.warehouse)?;
    let diagnoser = AnthropicClient::from_config(&cfg.llm)?;
    Ok((Box::new(warehouse), Box::new(diagnoser)))
}

enum Delivery {
    Off,
    Print(DryRunNotifier),
    Collect(RecordingNotifier),
    Smtp(SmtpNotifier),
}

impl Delivery {
    fn choose(cfg: &Config, args: &ScanArgs) -> Self {
        if !cfg.notify.enabled || (args.no_notify && !args.summary) {
            return Self::Off;
        }
        if args.dry_run || args.demo {
            return if args.json {
                Self::Collect(RecordingNotifier::default())
            } else {
                Self::Print(DryRunNotifier)
            };
        }
        match SmtpNotifier::from_config(&cfg.notify) {
            Ok(n) => Self::Smtp(n),
            Err(e) => {
                eprintln!("[sentinel] notifications disabled: {e}");
                Self::Off
            }
        }
    }

    fn notifier(&self) -> Option<&dyn Notifier> {
        match self {
            Self::Off => None,
            Self::Print(n) => Some(n),
            Self::Collect(n) => Some(n),
            Self::Smtp(n) => Some(n),
        }
    }

    fn collected(&self) -> Vec<Email> {
        match self {
            Self::Collect(n) => n.sent(),
            _ => Vec::new(),
        }
    }
}

/// Store each incident; returns the new ids in order, `None` where storing
/// failed or was skipped.
fn record_all(cfg: &Config, incidents: &[Incident]) -> Vec<Option<i64>> {
    let none = || vec![None; incidents.len()];
    let Some(path) = history::db_path(&cfg.history) else {
        eprintln!("[sentinel] warning: cannot determine history DB path, incidents not recorded");
        return none();
    };
    let conn = match history::open_db(&path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[sentinel] warning: incidents not recorded: {e:#}");
            return none();
        }
    };
    incidents
        .iter()
        .map(
            |incident| match history::record_incident(&conn, incident, cfg.history.retention) {
                Ok(id) => Some(id),
                Err(e) => {
                    eprintln!(
                        "[sentinel] warning: could not record {}: {e:#}",
                        incident.task_name()
                    );
                    None
                }
            },
        )
        .collect()
}

#[derive(Serialize)]
struct RecordedIncident<'a> {
    id: Option<i64>,
    #[serde(flatten)]
    incident: &'a Incident,
}

#[derive(Serialize)]
struct ScanReport<'a> {
    incidents: Vec<RecordedIncident<'a>>,
    skipped: &'a [Skipped],
    summary: ExecutiveSummary,
    notifications_sent: usize,
    notification_failures: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    emails: Vec<Email>,
}

fn print_incident(n: usize, id: Option<i64>, incident: &Incident) {
    let savings = &incident.savings;
    let id = id.map_or_else(String::new, |id| format!("  (incident {id})"));
    println!("#{n} {}{id}", incident.task_name());
    println!("  error:    {}", truncate_chars(incident.error_message(), 100));
    println!(
        "  fix:      {}",
        if incident.fixed_sql().is_some() {
            "proposed"
        } else {
            "none"
        }
    );
    println!(
        "  analysis: {}",
        incident
            .investigation
            .diagnosis
            .as_ref()
            .map_or("none (model unavailable)", |d| d.reasoning_steps.coverage())
    );
    let speculative = if savings.speculative {
        "  [no run history, placeholder estimate]"
    } else {
        ""
    };
    println!(
        "  savings:  {}/year ({}% faster, {} runs/year on {}){speculative}",
        format_usd(savings.annual_cost_saved_usd),
        savings.estimated_improvement_pct,
        format_num(i64::try_from(savings.executions_per_year).unwrap_or(i64::MAX)),
        savings.warehouse_size,
    );
}

pub fn cmd_scan(cfg: &Config, args: &ScanArgs) -> anyhow::Result<i32> {
    let (warehouse, diagnoser) = connect(cfg, args.demo)?;
    let delivery = Delivery::choose(cfg, args);
    let sentinel = Sentinel {
        warehouse: warehouse.as_ref(),
        diagnoser: diagnoser.as_ref(),
        notifier: delivery.notifier(),
        config: cfg,
    };
    let hours_back = args.hours.unwrap_or(cfg.warehouse.detection_window_hours);
    let outcome = sentinel.run(&ScanOptions {
        hours_back,
        notify_each: !args.no_notify,
        summary: args.summary,
    })?;

    let ids = if args.no_record {
        vec![None; outcome.incidents.len()]
    } else {
        record_all(cfg, &outcome.incidents)
    };
    let summary = outcome.summary();

    if args.json {
        print_json(&ScanReport {
            incidents: outcome
                .incidents
                .iter()
                .zip(&ids)
                .map(|(incident, id)| RecordedIncident { id: *id, incident })
                .collect(),
            skipped: &outcome.skipped,
            summary,
            notifications_sent: outcome.notifications_sent,
            notification_failures: outcome.notification_failures,
            emails: delivery.collected(),
        });
        return Ok(0);
    }

    if outcome.incidents.is_empty() && outcome.skipped.is_empty() {
        eprintln!("[sentinel] no failed tasks in the last {hours_back} hours");
        return Ok(0);
    }

    for (n, (incident, id)) in outcome.incidents.iter().zip(&ids).enumerate() {
        print_incident(n + 1, *id, incident);
    }
    for skipped in &outcome.skipped {
        eprintln!(
            "[sentinel] skipped {}: {}",
            skipped.task_name, skipped.reason
        );
    }
    println!();
    println!(
        "Total potential savings: {}/year across {} incidents (average improvement {:.1}%)",
        format_usd(summary.total_annual_savings_usd),
        summary.incidents,
        summary.average_improvement_pct,
    );
    if summary.speculative_count > 0 {
        println!(
            "{} estimate(s) use placeholder stats because the task has no run history",
            summary.speculative_count
        );
    }
    if outcome.notifications_sent + outcome.notification_failures > 0 {
        eprintln!(
            "[sentinel] notifications: {} sent, {} failed",
            outcome.notifications_sent, outcome.notification_failures
        );
    }
    Ok(0)
}

pub fn cmd_failures(cfg: &Config, hours: Option<u32>, demo: bool, json: bool) -> anyhow::Result<i32> {
    let hours_back = hours.unwrap_or(cfg.warehouse.detection_window_hours);
    let failures = if demo {
        DemoWarehouse.failed_tasks(hours_back)?
    } else {
        SnowflakeClient::from_config(&cfg.warehouse)?.failed_tasks(hours_back)?
    };

    if json {
        print_json(&failures);
        return Ok(0);
    }
    if failures.is_empty() {
        eprintln!("[sentinel] no failed tasks in the last {hours_back} hours");
        return Ok(0);
    }
    for f in &failures {
        println!(
            "{}  {}  [{}]  {}",
            f.scheduled_time,
            f.task_name,
            f.error_code.as_deref().unwrap_or("-"),
            truncate_chars(&f.error_message, 80)
        );
    }
    let distinct = warehouse::latest_failure_per_task(failures.clone()).len();
    eprintln!(
        "[sentinel] {} failed runs across {distinct} tasks",
        failures.len()
    );
    Ok(0)
}
