//! Measurement parsing.
//!
//! XFA measurements are a number followed by an optional unit (`in`, `cm`,
//! `mm`, `pt`, `px`). Everything in this crate is expressed in points.

/// Points per inch.
pub const PT_PER_IN: f64 = 72.0;

/// Parse a measurement into points. A bare number is taken as points.
pub fn parse_measure(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);
    let value: f64 = number.parse().ok()?;
    let factor = match unit.trim() {
        "" | "pt" | "px" => 1.0,
        "in" => PT_PER_IN,
        "cm" => PT_PER_IN / 2.54,
        "mm" => PT_PER_IN / 25.4,
        "em" => 10.0,
        _ => return None,
    };
    Some(value * factor)
}

/// Parse a whitespace separated list of measurements (`columnWidths`).
/// Unparseable entries become `-1`, which means "size to content".
pub fn parse_measure_list(raw: &str) -> Vec<f64> {
    raw.split_whitespace()
        .map(|item| parse_measure(item).unwrap_or(-1.0))
        .collect()
}
