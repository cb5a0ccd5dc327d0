//! Row-wise accessors over the string-typed staging frames.

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::{AnyValue, DataFrame};

pub fn any_to_string(value: AnyValue) -> String {
    match value {
        AnyValue::String(value) => value.to_string(),
        AnyValue::StringOwned(value) => value.to_string(),
        AnyValue::Null => String::new(),
        _ => value.to_string(),
    }
}

pub fn any_to_f64(value: AnyValue) -> Option<f64> {
    match value {
        AnyValue::Null => None,
        AnyValue::Float32(value) => Some(value as f64),
        AnyValue::Float64(value) => Some(value),
        AnyValue::Int32(value) => Some(value as f64),
        AnyValue::Int64(value) => Some(value as f64),
        AnyValue::String(value) => parse_f64(value),
        AnyValue::StringOwned(value) => parse_f64(&value),
        _ => None,
    }
}

pub fn any_to_i64(value: AnyValue) -> Option<i64> {
    match value {
        AnyValue::Null => None,
        AnyValue::Int32(value) => Some(value as i64),
        AnyValue::Int64(value) => Some(value),
        AnyValue::UInt32(value) => Some(value as i64),
        AnyValue::UInt64(value) => Some(value as i64),
        AnyValue::Float64(value) => Some(value as i64),
        AnyValue::String(value) => parse_i64(value),
        AnyValue::StringOwned(value) => parse_i64(&value),
        _ => None,
    }
}

pub fn parse_f64(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

pub fn parse_i64(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    // Exports sometimes carry integral ids as "123.0".
    trimmed
        .parse::<i64>()
        .ok()
        .or_else(|| trimmed.parse::<f64>().ok().map(|v| v as i64))
}

/// Timestamps arrive as `YYYY-MM-DD HH:MM:SS`; date-only values are
/// widened to midnight.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

pub fn column_string(df: &DataFrame, name: &str, idx: usize) -> String {
    match df.column(name) {
        Ok(series) => any_to_string(series.get(idx).unwrap_or(AnyValue::Null)),
        Err(_) => String::new(),
    }
}

/// Empty cells become `None`; staging frames carry missing values as
/// empty strings.
pub fn column_opt_string(df: &DataFrame, name: &str, idx: usize) -> Option<String> {
    let value = column_string(df, name, idx);
    if value.trim().is_empty() { None } else { Some(value) }
}

pub fn column_f64(df: &DataFrame, name: &str, idx: usize) -> Option<f64> {
    match df.column(name) {
        Ok(series) => any_to_f64(series.get(idx).unwrap_or(AnyValue::Null)),
        Err(_) => None,
    }
}

pub fn column_i64(df: &DataFrame, name: &str, idx: usize) -> Option<i64> {
    match df.column(name) {
        Ok(series) => any_to_i64(series.get(idx).unwrap_or(AnyValue::Null)),
        Err(_) => None,
    }
}

pub fn column_datetime(df: &DataFrame, name: &str, idx: usize) -> Option<NaiveDateTime> {
    column_opt_string(df, name, idx).and_then(|raw| parse_datetime(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_integral_floats_as_ids() {
        assert_eq!(parse_i64("123"), Some(123));
        assert_eq!(parse_i64("123.0"), Some(123));
        assert_eq!(parse_i64(""), None);
        assert_eq!(parse_i64("  "), None);
    }

    #[test]
    fn widens_date_only_timestamps() {
        let parsed = parse_datetime("2020-01-03").unwrap();
        assert_eq!(parsed.format("%H:%M:%S").to_string(), "00:00:00");
        assert!(parse_datetime("2020-01-03 11:30:00").is_some());
        assert!(parse_datetime("not a date").is_none());
    }
}
