//! Per-field typed conversion and derived review fields.
//!
//! Nothing in here fails: a value that cannot be converted becomes the
//! missing marker (`None`).

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::types::Value;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// Parse a numeric cell. Non-finite results count as missing.
pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) if n.is_finite() => Some(*n),
        Value::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Parse a date cell into a timezone-free timestamp. Offsets in RFC 3339
/// input are dropped, keeping the wall-clock time as written.
pub fn parse_date(value: &Value) -> Option<NaiveDateTime> {
    let text = match value {
        Value::Date(d) => return Some(*d),
        Value::Text(s) => s.trim(),
        _ => return None,
    };
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Trimmed text; empty strings are kept
pub fn coerce_text(value: &Value) -> Option<String> {
    value.as_text().map(|s| s.trim().to_string())
}

/// Trimmed review text; empty is indistinguishable from absent
pub fn clean_review_text(value: &Value) -> Option<String> {
    coerce_text(value).filter(|s| !s.is_empty())
}

/// Infer the maximum possible raw rating (5, 10 or 100) from the largest
/// observed value. Best effort: a 10-point file whose ratings never exceed
/// 5 is read as a 5-point file.
pub fn infer_rating_scale<I>(ratings: I) -> u32
where
    I: IntoIterator<Item = Option<f64>>,
{
    let vmax = ratings.into_iter().flatten().fold(None, |acc: Option<f64>, v| {
        Some(acc.map_or(v, |m| m.max(v)))
    });
    match vmax {
        None => 5,
        Some(v) if v > 5.0 && v <= 10.0 => 10,
        Some(v) if v > 10.0 && v <= 100.0 => 100,
        Some(_) => 5,
    }
}

/// Rescale a raw rating onto 1..5 for the file's scale
pub fn rating_to_five_point(raw: Option<f64>, scale: u32) -> Option<f64> {
    raw.map(|r| r / f64::from(scale) * 5.0)
}

/// Fill a missing or zero tip percentage from the tip amount when the bill
/// is positive; otherwise keep what the source said
pub fn compute_tip_percentage(
    tip_percentage: Option<f64>,
    total_spent: Option<f64>,
    tip_amount: Option<f64>,
) -> Option<f64> {
    let needs = tip_percentage.map_or(true, |p| p == 0.0);
    match (needs, total_spent, tip_amount) {
        (true, Some(total), Some(tip)) if total > 0.0 => Some(tip / total * 100.0),
        _ => tip_percentage,
    }
}

/// Clamp tip percentages above `cap`; values at or below it are unchanged
pub fn cap_tip_percentage(tip_percentage: Option<f64>, cap: f64) -> Option<f64> {
    tip_percentage.map(|p| if p > cap { cap } else { p })
}

/// ln(1 + max(total_spent, 0))
pub fn log_total_spent(total_spent: Option<f64>) -> Option<f64> {
    total_spent.map(|t| t.max(0.0).ln_1p())
}

/// Character count of the review
pub fn review_length(text: Option<&str>) -> Option<usize> {
    text.map(|t| t.chars().count())
}

/// First `max_len` characters of the review
pub fn truncate_review(text: Option<&str>, max_len: usize) -> Option<String> {
    text.map(|t| t.chars().take(max_len).collect())
}
