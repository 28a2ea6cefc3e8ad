//! Human-in-the-loop notifications: a fix proposal per incident and a daily
//! summary, rendered as HTML email.

pub mod smtp;

use std::cell::RefCell;
use std::fmt::Write as _;

use chrono::{DateTime, TimeZone};
use serde::Serialize;

use crate::incident::{ExecutiveSummary, Incident};
use crate::output::{format_num, format_usd, truncate_chars};

/// Characters of the error message shown per row of the summary.
const SUMMARY_ERROR_CHARS: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("email build error: {0}")]
    Build(String),

    #[error("notifications not configured: {0} is not set")]
    NotConfigured(&'static str),
}

/// A rendered message, ready for any transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    pub subject: String,
    pub html_body: String,
}

pub trait Notifier {
    /// # Errors
    /// Returns a [`NotifyError`] if the message could not be delivered.
    fn send(&self, email: &Email) -> Result<(), NotifyError>;
}

/// Prints messages to stdout instead of sending them.
#[derive(Debug, Default)]
pub struct DryRunNotifier;

impl Notifier for DryRunNotifier {
    fn send(&self, email: &Email) -> Result<(), NotifyError> {
        println!("--- email: {} ---", email.subject);
        println!("{}", email.html_body);
        Ok(())
    }
}

/// Keeps every message it is handed.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: RefCell<Vec<Email>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Email> {
        self.sent.borrow().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, email: &Email) -> Result<(), NotifyError> {
        self.sent.borrow_mut().push(email.clone());
        Ok(())
    }
}

/// Escape text for inclusion in HTML element content or attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const CELL: &str = "padding: 10px; border: 1px solid #ddd;";

fn impact_row(out: &mut String, label: &str, value: &str, shaded: bool) {
    let bg = if shaded {
        " style=\"background-color: #f5f5f5;\""
    } else {
        ""
    };
    let _ = write!(
        out,
        "\n    <tr{bg}><td style=\"{CELL}\"><strong>{label}</strong></td><td style=\"{CELL}\">{value}</td></tr>"
    );
}

/// Message proposing the fix for one incident.
pub fn compose_fix_proposal<Tz>(incident: &Incident, now: &DateTime<Tz>) -> Email
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let savings = &incident.savings;
    let fixed = incident
        .fixed_sql()
        .map_or_else(|| "No automated fix available".to_string(), escape_html);

    let mut body = String::new();
    let _ = write!(
        body,
        "<html>
<body style=\"font-family: Arial, sans-serif; line-height: 1.6;\">
  <h2 style=\"color: #1e88e5;\">Task Failure Detected</h2>
  <div style=\"background-color: #fff3cd; padding: 15px; border-left: 4px solid #ffc107; margin: 20px 0;\">
    <strong>Task:</strong> {task}<br>
    <strong>Error:</strong> {error}<br>
    <strong>Timestamp:</strong> {ts}
  </div>
  <h3>Proposed Fix</h3>
  <h4>Original SQL (Broken):</h4>
  <pre style=\"background-color: #f5f5f5; padding: 15px; border: 1px solid #ddd; overflow-x: auto;\">{original}</pre>
  <h4>Fixed SQL:</h4>
  <pre style=\"background-color: #e8f5e9; padding: 15px; border: 1px solid #4caf50; overflow-x: auto;\">{fixed}</pre>
  <h3>Financial Impact</h3>
  <table style=\"border-collapse: collapse; width: 100%; margin: 20px 0;\">",
        task = escape_html(incident.task_name()),
        error = escape_html(incident.error_message()),
        ts = now.format("%Y-%m-%d %H:%M:%S"),
        original = escape_html(incident.original_sql()),
    );
    impact_row(
        &mut body,
        "Warehouse Size",
        &escape_html(&savings.warehouse_size),
        true,
    );
    impact_row(
        &mut body,
        "Current Runtime",
        &format!("{:.2} seconds", savings.avg_execution_time_seconds),
        false,
    );
    impact_row(
        &mut body,
        "Estimated Improvement",
        &format!("{}%", savings.estimated_improvement_pct),
        true,
    );
    impact_row(
        &mut body,
        "Annual Executions",
        &format_num(i64::try_from(savings.executions_per_year).unwrap_or(i64::MAX)),
        false,
    );
    impact_row(
        &mut body,
        "Annual Savings",
        &format!("<strong>{}</strong>", format_usd(savings.annual_cost_saved_usd)),
        true,
    );
    body.push_str("\n  </table>\n");
    if savings.speculative {
        body.push_str(
            "  <p style=\"color: #b26a00;\"><strong>Note:</strong> no run history was found for this task; \
             the estimate uses a 10 second X-Small placeholder.</p>\n",
        );
    }
    body.push_str(
        "  <div style=\"background-color: #e3f2fd; padding: 15px; border-left: 4px solid #1e88e5; margin: 20px 0;\">
    <strong>Next Steps:</strong><br>
    1. Review the proposed SQL fix above<br>
    2. Approve or reject it with <code>sentinel history approve|reject ID</code><br>
    3. Deploy approved fixes through your usual change process
  </div>
</body>
</html>
",
    );

    Email {
        subject: format!("[Sentinel] Fix Proposed: {}", incident.task_name()),
        html_body: body,
    }
}

/// One message covering every incident of a scan.
pub fn compose_summary<Tz>(incidents: &[Incident], now: &DateTime<Tz>) -> Email
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let totals = ExecutiveSummary::from_reports(incidents.iter().map(|i| &i.savings));

    let mut rows = String::new();
    for incident in incidents {
        let _ = write!(
            rows,
            "\n    <tr><td style=\"{CELL}\">{task}</td><td style=\"{CELL}\">{error}</td><td style=\"{CELL}\">{usd}</td></tr>",
            task = escape_html(incident.task_name()),
            error = escape_html(&truncate_chars(incident.error_message(), SUMMARY_ERROR_CHARS)),
            usd = format_usd(incident.savings.annual_cost_saved_usd),
        );
    }

    let html_body = format!(
        "<html>
<body style=\"font-family: Arial, sans-serif; line-height: 1.6;\">
  <h2 style=\"color: #1e88e5;\">Sentinel Daily Summary</h2>
  <div style=\"background-color: #fff3cd; padding: 15px; border-left: 4px solid #ffc107; margin: 20px 0;\">
    <strong>Date:</strong> {date}<br>
    <strong>Failed Tasks:</strong> {n}<br>
    <strong>Total Potential Savings:</strong> {total}/year
  </div>
  <h3>Incidents Detected</h3>
  <table style=\"border-collapse: collapse; width: 100%; margin: 20px 0;\">
    <tr style=\"background-color: #1e88e5; color: white;\"><th style=\"{CELL} text-align: left;\">Task Name</th><th style=\"{CELL} text-align: left;\">Error</th><th style=\"{CELL} text-align: left;\">Annual Savings</th></tr>{rows}
  </table>
</body>
</html>
",
        date = now.format("%Y-%m-%d"),
        n = incidents.len(),
        total = format_usd(totals.total_annual_savings_usd),
    );

    Email {
        subject: format!(
            "[Sentinel] Daily Summary: {} Tasks Need Attention",
            incidents.len()
        ),
        html_body,
    }
}
