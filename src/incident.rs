//! The unit of work: one failed task, what was found out about it, and what
//! fixing it is worth.

use serde::{Deserialize, Serialize};

use crate::diagnosis::Diagnosis;
use crate::savings::SavingsReport;
use crate::warehouse::TaskFailure;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investigation {
    pub task_name: String,
    pub query_text: String,
    pub error_message: String,
    pub table_ddl: Option<String>,
    /// `None` when the model could not be consulted.
    pub diagnosis: Option<Diagnosis>,
    pub execution_time_ms: Option<f64>,
}

impl Investigation {
    pub fn fixed_sql(&self) -> Option<&str> {
        self.diagnosis.as_ref()?.fixed_sql.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub failure: TaskFailure,
    pub investigation: Investigation,
    /// Schedule the savings were computed with.
    pub schedule: String,
    pub savings: SavingsReport,
}

impl Incident {
    pub fn task_name(&self) -> &str {
        &self.failure.task_name
    }

    pub fn error_message(&self) -> &str {
        &self.failure.error_message
    }

    pub fn original_sql(&self) -> &str {
        &self.investigation.query_text
    }

    pub fn fixed_sql(&self) -> Option<&str> {
        self.investigation.fixed_sql()
    }
}

/// Totals across a batch of savings reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutiveSummary {
    pub incidents: usize,
    pub total_annual_savings_usd: f64,
    pub average_improvement_pct: f64,
    /// Reports computed from placeholder stats rather than real history.
    pub speculative_count: usize,
}

impl ExecutiveSummary {
    pub fn from_reports<'a>(reports: impl IntoIterator<Item = &'a SavingsReport>) -> Self {
        let mut incidents = 0usize;
        let mut total = 0.0;
        let mut pct_sum = 0u64;
        let mut speculative_count = 0usize;
        for r in reports {
            incidents += 1;
            total += r.annual_cost_saved_usd;
            pct_sum += u64::from(r.estimated_improvement_pct);
            if r.speculative {
                speculative_count += 1;
            }
        }
        #[allow(clippy::cast_precision_loss)]
        let average_improvement_pct = if incidents == 0 {
            0.0
        } else {
            pct_sum as f64 / incidents as f64
        };
        Self {
            incidents,
            total_annual_savings_usd: crate::savings::round_to(total, 2),
            average_improvement_pct,
            speculative_count,
        }
    }
}
