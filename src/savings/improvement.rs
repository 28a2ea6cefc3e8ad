/// Fix patterns and the runtime improvement (percent) each one is credited with.
///
/// Order matters: the first pattern found in the fix wins, even if a later one
/// would be a better description of it.
pub const IMPROVEMENT_PATTERNS: &[(&str, u32)] = &[
    ("division by zero", 5),
    ("missing column", 100),
    ("missing table", 100),
    ("case statement", 5),
    ("coalesce", 5),
    ("index", 30),
    ("partition", 40),
];

/// Improvement credited when no pattern matches.
pub const DEFAULT_IMPROVEMENT_PCT: u32 = 10;

/// Guess the runtime improvement of a fix, in percent.
///
/// Only `fixed_sql` is scanned; `original_sql` is accepted so the signature
/// can grow into a real comparison but is currently ignored. The scan is a
/// case-insensitive substring search over [`IMPROVEMENT_PATTERNS`].
pub fn estimate_improvement_percent(_original_sql: &str, fixed_sql: &str) -> u32 {
    let fixed_lower = fixed_sql.to_lowercase();
    IMPROVEMENT_PATTERNS
        .iter()
        .find(|(pattern, _)| fixed_lower.contains(pattern))
        .map_or(DEFAULT_IMPROVEMENT_PCT, |(_, pct)| *pct)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesce_fix() {
        assert_eq!(estimate_improvement_percent("", "fix uses COALESCE(x,0)"), 5);
    }

    #[test]
    fn index_fix() {
        assert_eq!(estimate_improvement_percent("", "add an index"), 30);
    }

    #[test]
    fn partition_fix() {
        assert_eq!(
            estimate_improvement_percent("", "-- prune by PARTITION date"),
            40
        );
    }

    #[test]
    fn no_pattern_gives_default() {
        assert_eq!(
            estimate_improvement_percent("", "no recognizable pattern"),
            10
        );
    }

    #[test]
    fn table_order_beats_match_position() {
        // "index" appears first in the text but "coalesce" is listed earlier
        let fixed = "create index idx; select coalesce(a, 0)";
        assert_eq!(estimate_improvement_percent("", fixed), 5);
    }

    #[test]
    fn original_sql_is_not_inspected() {
        assert_eq!(
            estimate_improvement_percent("-- missing table", "select 1"),
            DEFAULT_IMPROVEMENT_PCT
        );
    }
}
