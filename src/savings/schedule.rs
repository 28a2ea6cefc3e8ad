//! Convert a task's recurrence description into an annual execution count.

use std::sync::LazyLock;

use regex::Regex;

const MINUTES_PER_YEAR: u64 = 365 * 24 * 60;
const HOURS_PER_YEAR: u64 = 365 * 24;
const DAYS_PER_YEAR: u64 = 365;

/// Runs per year assumed when a schedule names no recognised unit.
pub const DEFAULT_ANNUAL_RUNS: u64 = DAYS_PER_YEAR;

/// A schedule names a unit but carries no usable magnitude.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed schedule {schedule:?}: {reason}")]
pub struct MalformedScheduleError {
    pub schedule: String,
    pub reason: &'static str,
}

/// Recurrence units, in the order they are looked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleUnit {
    Minute,
    Hour,
    Day,
}

impl ScheduleUnit {
    const SEARCH_ORDER: [Self; 3] = [Self::Minute, Self::Hour, Self::Day];

    const fn keyword(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }

    const fn per_year(self) -> u64 {
        match self {
            Self::Minute => MINUTES_PER_YEAR,
            Self::Hour => HOURS_PER_YEAR,
            Self::Day => DAYS_PER_YEAR,
        }
    }

    /// First unit (in search order) whose keyword appears anywhere in `lower`.
    fn find_in(lower: &str) -> Option<Self> {
        Self::SEARCH_ORDER
            .into_iter()
            .find(|unit| lower.contains(unit.keyword()))
    }
}

static DIGIT_RUN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\d+").ok());

/// First run of decimal digits anywhere in `s`. `\d` is Unicode-aware, so
/// fullwidth or Arabic-Indic digits count as well as ASCII ones.
fn first_digit_run(s: &str) -> Option<&str> {
    DIGIT_RUN.as_ref()?.find(s).map(|m| m.as_str())
}

fn is_decimal_digit(c: char) -> bool {
    let mut buf = [0u8; 4];
    DIGIT_RUN
        .as_ref()
        .is_some_and(|re| re.is_match(c.encode_utf8(&mut buf)))
}

/// Value of a decimal digit of any script.
///
/// Every Unicode decimal digit set is ten consecutive code points from zero
/// to nine, and adjacent sets start on a zero, so the value is the number of
/// digits directly below `c` modulo ten.
fn decimal_value(c: char) -> Option<u64> {
    if let Some(d) = c.to_digit(10) {
        return Some(u64::from(d));
    }
    if !is_decimal_digit(c) {
        return None;
    }
    let mut below = 0u64;
    let mut cp = u32::from(c);
    while let Some(prev) = cp.checked_sub(1).and_then(char::from_u32) {
        if !is_decimal_digit(prev) {
            break;
        }
        below += 1;
        cp -= 1;
    }
    Some(below % 10)
}

/// Numeric value of a digit run; `None` if it does not fit in `u64`.
fn parse_digits(run: &str) -> Option<u64> {
    run.chars().try_fold(0u64, |acc, c| {
        acc.checked_mul(10)?.checked_add(decimal_value(c)?)
    })
}

/// Number of times a task with this schedule runs in a (365-day) year.
///
/// Matching is a case-insensitive substring search: `minute` is tried first,
/// then `hour`, then `day`, and the first run of digits anywhere in the string
/// is the interval. A schedule without any of those words (a CRON expression,
/// for instance) silently counts as once a day; callers that care should warn
/// about it via [`names_known_unit`].
///
/// # Errors
///
/// Returns [`MalformedScheduleError`] when a unit is present but the interval
/// is missing, zero, or too large to represent.
pub fn annual_runs(schedule: &str) -> Result<u64, MalformedScheduleError> {
    let lower = schedule.to_lowercase();
    let Some(unit) = ScheduleUnit::find_in(&lower) else {
        return Ok(DEFAULT_ANNUAL_RUNS);
    };

    let malformed = |reason| MalformedScheduleError {
        schedule: schedule.to_string(),
        reason,
    };

    let digits = first_digit_run(&lower).ok_or_else(|| malformed("no interval given"))?;
    let interval = parse_digits(digits).ok_or_else(|| malformed("interval out of range"))?;
    if interval == 0 {
        return Err(malformed("interval must be positive"));
    }
    Ok(unit.per_year() / interval)
}

/// Whether `schedule` names a unit [`annual_runs`] understands.
pub fn names_known_unit(schedule: &str) -> bool {
    ScheduleUnit::find_in(&schedule.to_lowercase()).is_some()
}
