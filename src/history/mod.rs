use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context as _;
use rusqlite::Connection;
use serde::Serialize;

use crate::config::HistoryConfig;
use crate::incident::Incident;
use crate::savings::SavingsReport;

/// Review state of a proposed fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Pending,
    Approved,
    Rejected,
}

impl Decision {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => anyhow::bail!("unknown incident status {other:?}"),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecisionError {
    #[error("incident {0} not found")]
    NotFound(i64),
    #[error("incident {id} was already {status}")]
    AlreadyDecided { id: i64, status: Decision },
    #[error("an incident can only be approved or rejected")]
    NotAFinalDecision,
}

/// A stored incident.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentRecord {
    pub id: i64,
    pub timestamp: String,
    pub task_name: String,
    pub error_message: String,
    pub original_sql: String,
    pub fixed_sql: Option<String>,
    pub diagnosis: Option<String>,
    pub schedule: String,
    pub savings: SavingsReport,
    pub status: Decision,
    pub decided_at: Option<String>,
}

/// Totals over every stored incident.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistorySummary {
    pub total: i64,
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
    pub speculative: i64,
    pub total_annual_savings_usd: f64,
    pub approved_annual_savings_usd: f64,
}

/// Resolve the DB path: the configured path (also set by `SENTINEL_DB_PATH`),
/// else `{data_local_dir}/sentinel/incidents.db`.
pub fn db_path(config: &HistoryConfig) -> Option<PathBuf> {
    if let Some(p) = &config.db_path {
        return Some(p.clone());
    }
    dirs::data_local_dir().map(|d| d.join("sentinel").join("incidents.db"))
}

/// Open or create the DB at `path` and make sure the schema exists.
///
/// # Errors
/// Returns an error if the directory cannot be created or the DB cannot be opened.
pub fn open_db(path: &Path) -> anyhow::Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create db dir {}", parent.display()))?;
    }
    let conn = Connection::open(path).with_context(|| format!("open db at {}", path.display()))?;
    init_incidents_table(&conn)?;
    Ok(conn)
}

/// # Errors
/// Returns an error if the table creation fails.
pub fn init_incidents_table(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS incidents (
            id                     INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp              TEXT    NOT NULL,
            task_name              TEXT    NOT NULL,
            error_message          TEXT    NOT NULL,
            original_sql           TEXT    NOT NULL,
            fixed_sql              TEXT,
            diagnosis              TEXT,
            schedule               TEXT    NOT NULL,
            report                 TEXT    NOT NULL,
            annual_cost_saved_usd  REAL    NOT NULL,
            speculative            INTEGER NOT NULL,
            status                 TEXT    NOT NULL DEFAULT 'pending',
            decided_at             TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_incidents_task ON incidents(task_name);
        CREATE INDEX IF NOT EXISTS idx_incidents_status ON incidents(status);",
    )
    .context("create incidents table")?;
    Ok(())
}

/// Store an incident as pending and prune all but the newest `retention`.
/// Returns the new incident id.
///
/// # Errors
/// Returns an error if the INSERT or DELETE operations fail.
pub fn record_incident(
    conn: &Connection,
    incident: &Incident,
    retention: u32,
) -> anyhow::Result<i64> {
    let report = serde_json::to_string(&incident.savings).context("serialize savings report")?;
    let diagnosis = incident
        .investigation
        .diagnosis
        .as_ref()
        .map(|d| d.full_analysis.as_str());
    conn.execute(
        "INSERT INTO incidents
            (timestamp, task_name, error_message, original_sql, fixed_sql, diagnosis,
             schedule, report, annual_cost_saved_usd, speculative)
         VALUES
            (strftime('%Y-%m-%dT%H:%M:%SZ','now'), ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            incident.task_name(),
            incident.error_message(),
            incident.original_sql(),
            incident.fixed_sql(),
            diagnosis,
            incident.schedule,
            report,
            incident.savings.annual_cost_saved_usd,
            incident.savings.speculative,
        ],
    )
    .context("insert incident")?;
    let id = conn.last_insert_rowid();

    conn.execute(
        "DELETE FROM incidents
         WHERE id NOT IN (
             SELECT id FROM incidents
             ORDER BY id DESC
             LIMIT ?1
         )",
        rusqlite::params![i64::from(retention)],
    )
    .context("enforce incident retention")?;

    Ok(id)
}

const COLUMNS: &str = "id, timestamp, task_name, error_message, original_sql, fixed_sql,
    diagnosis, schedule, report, status, decided_at";

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<IncidentRecord> {
    let report: String = row.get(8)?;
    let savings = serde_json::from_str(&report).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let status: String = row.get(9)?;
    let status = status.parse::<Decision>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(IncidentRecord {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        task_name: row.get(2)?,
        error_message: row.get(3)?,
        original_sql: row.get(4)?,
        fixed_sql: row.get(5)?,
        diagnosis: row.get(6)?,
        schedule: row.get(7)?,
        savings,
        status,
        decided_at: row.get(10)?,
    })
}

/// Most recent incidents first.
///
/// # Errors
/// Returns an error if the query fails.
pub fn list_incidents(conn: &Connection, limit: usize) -> anyhow::Result<Vec<IncidentRecord>> {
    let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM incidents ORDER BY id DESC LIMIT ?1"
    ))?;
    let rows = stmt.query_map([limit_i64], map_row)?;
    let mut result = Vec::new();
    for row in rows {
        result.push(row.context("read incident row")?);
    }
    Ok(result)
}

/// # Errors
/// Returns an error if the query fails.
pub fn get_incident(conn: &Connection, id: i64) -> anyhow::Result<Option<IncidentRecord>> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM incidents WHERE id = ?1"))?;
    let mut rows = stmt.query([id])?;
    if let Some(row) = rows.next()? {
        Ok(Some(map_row(row)?))
    } else {
        Ok(None)
    }
}

/// Approve or reject a pending incident. A decision is final.
///
/// # Errors
/// Returns a [`DecisionError`] if the incident does not exist, was already
/// decided, or `decision` is [`Decision::Pending`]; other errors come from
/// the database.
pub fn set_decision(conn: &Connection, id: i64, decision: Decision) -> anyhow::Result<()> {
    if decision == Decision::Pending {
        return Err(DecisionError::NotAFinalDecision.into());
    }
    let changed = conn
        .execute(
            "UPDATE incidents
             SET status = ?2, decided_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
             WHERE id = ?1 AND status = 'pending'",
            rusqlite::params![id, decision.as_str()],
        )
        .context("update incident status")?;
    if changed == 1 {
        return Ok(());
    }
    match get_incident(conn, id)? {
        None => Err(DecisionError::NotFound(id).into()),
        Some(existing) => Err(DecisionError::AlreadyDecided {
            id,
            status: existing.status,
        }
        .into()),
    }
}

/// # Errors
/// Returns an error if the query fails.
pub fn summary(conn: &Connection) -> anyhow::Result<HistorySummary> {
    conn.query_row(
        "SELECT
            COUNT(*),
            COALESCE(SUM(status = 'pending'), 0),
            COALESCE(SUM(status = 'approved'), 0),
            COALESCE(SUM(status = 'rejected'), 0),
            COALESCE(SUM(speculative), 0),
            COALESCE(SUM(annual_cost_saved_usd), 0.0),
            COALESCE(SUM(CASE WHEN status = 'approved' THEN annual_cost_saved_usd END), 0.0)
         FROM incidents",
        [],
        |row| {
            Ok(HistorySummary {
                total: row.get(0)?,
                pending: row.get(1)?,
                approved: row.get(2)?,
                rejected: row.get(3)?,
                speculative: row.get(4)?,
                total_annual_savings_usd: row.get(5)?,
                approved_annual_savings_usd: row.get(6)?,
            })
        },
    )
    .context("summarize incidents")
}

/// Delete every incident and restart ids from 1.
///
/// # Errors
/// Returns an error if the DELETE operation fails.
pub fn clear_incidents(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("DELETE FROM incidents", [])
        .context("clear incidents")?;
    // sqlite_sequence has no row until the first insert.
    let _ = conn.execute("DELETE FROM sqlite_sequence WHERE name='incidents'", []);
    Ok(())
}
