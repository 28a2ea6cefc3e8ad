/// Credits consumed per hour by each warehouse size. Each tier doubles the last.
pub const WAREHOUSE_CREDITS: &[(&str, f64)] = &[
    ("X-Small", 1.0),
    ("Small", 2.0),
    ("Medium", 4.0),
    ("Large", 8.0),
    ("X-Large", 16.0),
    ("2X-Large", 32.0),
    ("3X-Large", 64.0),
    ("4X-Large", 128.0),
];

/// Size label assumed when the real one is unknown.
pub const SMALLEST_WAREHOUSE: &str = "X-Small";

/// Credits per hour for a warehouse size label (exact match).
///
/// Unknown labels are billed at the X-Small rate.
pub fn credits_per_hour(size_label: &str) -> f64 {
    WAREHOUSE_CREDITS
        .iter()
        .find(|(label, _)| *label == size_label)
        .map_or(1.0, |(_, credits)| *credits)
}
