//! Cleaning helpers shared by the mappers: admission inference,
//! value/unit decomposition, operator extraction and the chart
//! temperature plausibility filter.

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;

/// One admission interval, as staged from the admissions table.
#[derive(Debug, Clone)]
pub struct AdmissionSpan {
    pub hadm_id: i64,
    pub admittime: NaiveDateTime,
    pub dischtime: NaiveDateTime,
}

/// Per-subject admission intervals, sorted by admit time so interval
/// containment picks the earliest admission deterministically.
#[derive(Debug, Default)]
pub struct AdmissionIndex {
    by_subject: HashMap<i64, Vec<AdmissionSpan>>,
}

impl AdmissionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, subject_id: i64, span: AdmissionSpan) {
        let spans = self.by_subject.entry(subject_id).or_default();
        spans.push(span);
        spans.sort_by_key(|s| s.admittime);
    }

    /// Infer the admission containing `at`. Events between admissions
    /// stay unlinked; multiple containing intervals resolve to the
    /// earliest admit time, first row wins.
    pub fn infer(&self, subject_id: i64, at: NaiveDateTime) -> Option<i64> {
        self.by_subject.get(&subject_id).and_then(|spans| {
            spans
                .iter()
                .find(|s| s.admittime <= at && at <= s.dischtime)
                .map(|s| s.hadm_id)
        })
    }

    pub fn spans(&self, subject_id: i64) -> &[AdmissionSpan] {
        self.by_subject
            .get(&subject_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

static VALUE_UNIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(-?\d+\.?\d*)\s*([a-zA-Z]+)$").expect("value/unit pattern is valid")
});

static NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+\.?\d*").expect("numeric pattern is valid"));

static OPERATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(<=|>=|<|>|=)").expect("operator pattern is valid"));

/// Repair free-text values typed into a numeric field: `"36.5 c"`
/// becomes `(36.5, "c")`, overriding whatever the numeric/unit
/// columns said. Anything else passes through untouched.
pub fn decompose_value_unit(raw: &str) -> Option<(f64, String)> {
    let captures = VALUE_UNIT.captures(raw.trim())?;
    let number: f64 = captures.get(1)?.as_str().parse().ok()?;
    Some((number, captures.get(2)?.as_str().to_string()))
}

/// Leading comparison operator of a lab value, e.g. `"<=0.5"`.
pub fn extract_operator(raw: &str) -> Option<&'static str> {
    let m = OPERATOR.captures(raw)?;
    match m.get(1)?.as_str() {
        "<=" => Some("<="),
        ">=" => Some(">="),
        "<" => Some("<"),
        ">" => Some(">"),
        "=" => Some("="),
        _ => None,
    }
}

/// First numeric substring of a value, if any.
pub fn extract_number(raw: &str) -> Option<f64> {
    NUMERIC.find(raw)?.as_str().parse().ok()
}

pub fn fahrenheit_to_celsius(value: f64) -> f64 {
    (value - 32.0) * 5.0 / 9.0
}

/// Chart temperatures: convert Fahrenheit readings, then keep only
/// values inside the plausibility range. Returns `None` when the
/// reading is implausible and must be discarded.
pub fn plausible_temperature(
    value: f64,
    unit: Option<&str>,
    range: &RangeInclusive<f64>,
) -> Option<f64> {
    let is_fahrenheit = unit
        .map(|u| u.trim().eq_ignore_ascii_case("f") || u.trim().eq_ignore_ascii_case("°f"))
        .unwrap_or(false)
        // No unit but clearly a Fahrenheit-scale body temperature.
        || (unit.is_none() && value > 70.0);
    let celsius = if is_fahrenheit {
        fahrenheit_to_celsius(value)
    } else {
        value
    };
    range.contains(&celsius).then_some(celsius)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn span(hadm_id: i64, from: &str, to: &str) -> AdmissionSpan {
        AdmissionSpan {
            hadm_id,
            admittime: dt(from),
            dischtime: dt(to),
        }
    }

    #[test]
    fn containment_assigns_admission() {
        let mut index = AdmissionIndex::new();
        index.insert(10, span(1, "2020-01-01 00:00:00", "2020-01-05 00:00:00"));
        index.insert(10, span(2, "2020-01-10 00:00:00", "2020-01-15 00:00:00"));

        assert_eq!(index.infer(10, dt("2020-01-03 12:00:00")), Some(1));
        // Gap between admissions stays unlinked.
        assert_eq!(index.infer(10, dt("2020-01-08 12:00:00")), None);
        assert_eq!(index.infer(99, dt("2020-01-03 12:00:00")), None);
    }

    #[test]
    fn overlap_resolves_to_earliest_admittime() {
        let mut index = AdmissionIndex::new();
        index.insert(10, span(2, "2020-01-02 00:00:00", "2020-01-09 00:00:00"));
        index.insert(10, span(1, "2020-01-01 00:00:00", "2020-01-05 00:00:00"));
        assert_eq!(index.infer(10, dt("2020-01-03 00:00:00")), Some(1));
    }

    #[test]
    fn value_unit_decomposition() {
        assert_eq!(
            decompose_value_unit("36.5 c"),
            Some((36.5, "c".to_string()))
        );
        assert_eq!(decompose_value_unit("98.6F"), Some((98.6, "F".to_string())));
        assert_eq!(decompose_value_unit("-5 mm"), Some((-5.0, "mm".to_string())));
        assert_eq!(decompose_value_unit("120"), None);
        assert_eq!(decompose_value_unit("positive"), None);
        assert_eq!(decompose_value_unit("120/80 mmHg"), None);
    }

    #[test]
    fn operator_and_number_extraction() {
        assert_eq!(extract_operator("<=0.5"), Some("<="));
        assert_eq!(extract_operator(" >10"), Some(">"));
        assert_eq!(extract_operator("0.5"), None);
        assert_eq!(extract_number("<=0.5"), Some(0.5));
        assert_eq!(extract_number("negative"), None);
    }

    #[test]
    fn temperature_filter_converts_and_bounds() {
        let range = 25.0..=44.0;
        let celsius = plausible_temperature(98.6, Some("F"), &range).unwrap();
        assert!((celsius - 37.0).abs() < 0.01);
        assert_eq!(plausible_temperature(36.5, Some("C"), &range), Some(36.5));
        // Unitless Fahrenheit-scale reading is converted.
        assert!(plausible_temperature(98.6, None, &range).is_some());
        // Implausible after conversion.
        assert_eq!(plausible_temperature(500.0, Some("F"), &range), None);
        assert_eq!(plausible_temperature(10.0, Some("C"), &range), None);
    }
}
