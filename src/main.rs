mod config_cmd;
mod history_cmd;
mod savings_cmd;
mod scan_cmd;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use sentinel::config::{self, Config};

#[derive(Parser)]
#[command(
    name = "sentinel",
    version,
    about = "Find failed warehouse tasks, propose fixes, and price them"
)]
struct Cli {
    /// More log output (-v info, -vv debug); SENTINEL_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file to use instead of the discovered one
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect failed tasks, diagnose them, estimate savings and notify
    Scan(scan_cmd::ScanArgs),
    /// List failed task runs without investigating them
    Failures {
        /// Look back this many hours (default: warehouse.detection_window_hours)
        #[arg(long)]
        hours: Option<u32>,
        /// Use the bundled offline fixtures
        #[arg(long)]
        demo: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Estimate the annual savings of a fix
    Savings(savings_cmd::SavingsArgs),
    /// Annual executions implied by a schedule, e.g. "5 MINUTE"
    Runs {
        schedule: String,
    },
    /// Review recorded incidents
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List recent incidents
    List {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Show one incident in full
    Show {
        id: i64,
        #[arg(long)]
        json: bool,
    },
    /// Approve the proposed fix of an incident
    Approve { id: i64 },
    /// Reject the proposed fix of an incident
    Reject { id: i64 },
    /// Totals across all recorded incidents
    Summary {
        #[arg(long)]
        json: bool,
    },
    /// Delete all recorded incidents
    Clear,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration with secrets masked
    Show,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "sentinel=warn",
        1 => "sentinel=info",
        _ => "sentinel=debug",
    };
    let filter = EnvFilter::try_from_env("SENTINEL_LOG").unwrap_or_else(|_| default.into());
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Load the configuration for commands that need it.
fn load_config(explicit: Option<&Path>) -> anyhow::Result<Config> {
    let (cfg, path) = config::load(explicit)?;
    match &path {
        Some(p) => tracing::debug!(path = %p.display(), "loaded config"),
        None => tracing::debug!("no config file found, using defaults"),
    }
    Ok(cfg)
}

fn or_exit(r: anyhow::Result<i32>) -> i32 {
    r.unwrap_or_else(|e| {
        eprintln!("[sentinel] error: {e:#}");
        1
    })
}

fn with_config(cli: &Cli, f: impl FnOnce(&Config) -> anyhow::Result<i32>) -> i32 {
    or_exit(load_config(cli.config.as_deref()).and_then(|cfg| f(&cfg)))
}

fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = match &cli.command {
        Commands::Scan(args) => with_config(&cli, |cfg| scan_cmd::cmd_scan(cfg, args)),
        Commands::Failures { hours, demo, json } => {
            with_config(&cli, |cfg| scan_cmd::cmd_failures(cfg, *hours, *demo, *json))
        }
        Commands::Savings(args) => with_config(&cli, |cfg| savings_cmd::cmd_savings(cfg, args)),
        Commands::Runs { schedule } => or_exit(savings_cmd::cmd_runs(schedule)),
        Commands::History { action } => with_config(&cli, |cfg| match action {
            HistoryAction::List { limit, json } => history_cmd::cmd_history_list(cfg, *limit, *json),
            HistoryAction::Show { id, json } => history_cmd::cmd_history_show(cfg, *id, *json),
            HistoryAction::Approve { id } => {
                history_cmd::cmd_history_decide(cfg, *id, sentinel::history::Decision::Approved)
            }
            HistoryAction::Reject { id } => {
                history_cmd::cmd_history_decide(cfg, *id, sentinel::history::Decision::Rejected)
            }
            HistoryAction::Summary { json } => history_cmd::cmd_history_summary(cfg, *json),
            HistoryAction::Clear => history_cmd::cmd_history_clear(cfg),
        }),
        Commands::Config { action } => match action {
            ConfigAction::Show => or_exit(config_cmd::cmd_config_show(cli.config.as_deref())),
        },
    };
    std::process::exit(exit_code);
}
