//! Root-cause analysis of a failed query by a language model, and extraction
//! of the structured parts of its answer.

pub mod anthropic;

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// What the model is shown about a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureContext {
    pub query_text: String,
    pub error_message: String,
    pub table_ddl: Option<String>,
}

/// The five reasoning steps the prompt asks for. A step the model did not
/// mark is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningSteps {
    #[serde(rename = "step1_analyze_error")]
    pub analyze_error: Option<String>,
    #[serde(rename = "step2_context_check")]
    pub context_check: Option<String>,
    #[serde(rename = "step3_root_cause")]
    pub root_cause: Option<String>,
    #[serde(rename = "step4_propose_fix")]
    pub propose_fix: Option<String>,
    #[serde(rename = "step5_validation")]
    pub validation: Option<String>,
}

impl ReasoningSteps {
    /// Steps in order with their display titles.
    pub fn titled(&self) -> [(&'static str, Option<&str>); 5] {
        [
            ("STEP 1: Analyze Error", self.analyze_error.as_deref()),
            ("STEP 2: Context Check", self.context_check.as_deref()),
            ("STEP 3: Root Cause Identification", self.root_cause.as_deref()),
            ("STEP 4: Propose Fix", self.propose_fix.as_deref()),
            ("STEP 5: Validation", self.validation.as_deref()),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.titled().iter().all(|(_, step)| step.is_none())
    }

    pub fn is_complete(&self) -> bool {
        self.titled().iter().all(|(_, step)| step.is_some())
    }

    /// One line on how much structure the answer had.
    pub fn coverage(&self) -> &'static str {
        if self.is_complete() {
            "all 5 steps"
        } else if self.is_empty() {
            "unstructured"
        } else {
            "partial"
        }
    }

    /// Plain-text breakdown with a title per step. Missing steps are marked.
    pub fn render(&self) -> String {
        self.titled()
            .iter()
            .map(|(title, step)| {
                let body = step.map_or("(not provided)", step_body);
                format!("{title}\n{body}")
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// A step's text without its marker line, unless the marker line is all there is.
fn step_body(step: &str) -> &str {
    match step.split_once('\n') {
        Some((_, rest)) if !rest.trim().is_empty() => rest.trim(),
        _ => step.trim(),
    }
}

/// A model's answer about one failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub full_analysis: String,
    pub reasoning_steps: ReasoningSteps,
    pub fixed_sql: Option<String>,
}

impl Diagnosis {
    /// Structure a raw model answer.
    pub fn from_response(text: &str) -> Self {
        Self {
            full_analysis: text.to_string(),
            reasoning_steps: parse_reasoning_steps(text),
            fixed_sql: extract_fixed_sql(text),
        }
    }
}

/// Anything that can turn a failure into a diagnosis.
pub trait Diagnoser {
    /// # Errors
    /// Returns an error if the model cannot be reached or answers with nothing.
    fn diagnose(&self, context: &FailureContext) -> anyhow::Result<Diagnosis>;
}

/// Prompt asking for a five-step root-cause analysis.
pub fn build_prompt(context: &FailureContext) -> String {
    let ddl = context.table_ddl.as_deref().unwrap_or("Not available");
    format!(
        "You are a senior database engineer performing root cause analysis on a failed Snowflake task.

Follow this reasoning process and document each step:

STEP 1 - ANALYZE ERROR
Examine the error message and identify the specific failure type.

STEP 2 - CONTEXT CHECK
Review the SQL query and table DDL to understand what the query was attempting to do.

STEP 3 - ROOT CAUSE IDENTIFICATION
Determine the exact condition that triggered the failure.

STEP 4 - PROPOSE FIX
Provide the corrected SQL query in a ```sql code block, with inline comments explaining the changes.

STEP 5 - VALIDATION
Explain why this fix resolves the issue and what edge cases it handles.

---

FAILED QUERY:
{query}

ERROR MESSAGE:
{error}

TABLE DDL:
{ddl}

---

Provide your analysis following the 5-step structure above. Be specific and technical.",
        query = context.query_text,
        error = context.error_message,
    )
}

const STEP_MARKERS: [&str; 5] = ["STEP 1", "STEP 2", "STEP 3", "STEP 4", "STEP 5"];

/// Split a model answer on the `STEP 1`..`STEP 5` markers.
///
/// Each step runs from its marker to the next marker that appears after it,
/// or to the end of the text. Markers are matched case-sensitively.
pub fn parse_reasoning_steps(text: &str) -> ReasoningSteps {
    let mut sections: [Option<String>; 5] = Default::default();
    for (i, marker) in STEP_MARKERS.iter().enumerate() {
        let Some(start) = text.find(marker) else {
            continue;
        };
        let rest = &text[start + marker.len()..];
        let end = STEP_MARKERS[i + 1..]
            .iter()
            .filter_map(|next| rest.find(next))
            .min()
            .map_or(text.len(), |offset| start + marker.len() + offset);
        let section = text[start..end].trim();
        sections[i] = Some(section.to_string());
    }
    let [analyze_error, context_check, root_cause, propose_fix, validation] = sections;
    ReasoningSteps {
        analyze_error,
        context_check,
        root_cause,
        propose_fix,
        validation,
    }
}

static FENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```([A-Za-z]*)[^\n]*\n(.*?)```").ok());

/// Pull the proposed SQL out of a model answer.
///
/// Prefers the first code fence tagged `sql`, then the first untagged fence,
/// then the lines of the `STEP 4` section from the first one mentioning
/// `SELECT` through the first one ending the statement with `;`.
pub fn extract_fixed_sql(text: &str) -> Option<String> {
    if let Some(re) = FENCE.as_ref() {
        let mut untagged = None;
        for caps in re.captures_iter(text) {
            let lang = caps.get(1).map_or("", |m| m.as_str());
            let body = caps.get(2).map_or("", |m| m.as_str()).trim();
            if body.is_empty() {
                continue;
            }
            if lang.eq_ignore_ascii_case("sql") {
                return Some(body.to_string());
            }
            if lang.is_empty() && untagged.is_none() {
                untagged = Some(body.to_string());
            }
        }
        if untagged.is_some() {
            return untagged;
        }
    }
    select_from_step_four(text)
}

fn select_from_step_four(text: &str) -> Option<String> {
    let start = text.find("STEP 4")?;
    let section = &text[start + "STEP 4".len()..];
    let mut lines = Vec::new();
    let mut in_sql = false;
    for line in section.lines() {
        if !in_sql && line.to_uppercase().contains("SELECT") {
            in_sql = true;
        }
        if in_sql {
            lines.push(line);
            if line.contains(';') {
                break;
            }
        }
    }
    let sql = lines.join("\n");
    let sql = sql.trim();
    (!sql.is_empty()).then(|| sql.to_string())
}
