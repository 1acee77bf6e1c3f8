//! Normalized scalar values and inferred column kinds.
//!
//! Every value that crosses the data-source boundary is mapped into the
//! fixed scalar set below, so downstream components never branch on
//! driver-specific type representations.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single cell value in the normalized result model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Timestamp(NaiveDateTime),
    Null,
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(v) => Some(*v as f64),
            Scalar::Float(v) => Some(*v),
            Scalar::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Render the value the way it should appear in a prompt or a text table.
    pub fn render(&self) -> String {
        match self {
            Scalar::Int(v) => v.to_string(),
            Scalar::Float(v) => format!("{v}"),
            Scalar::Text(s) => s.clone(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            Scalar::Null => "NULL".to_string(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Inferred role of a column, used by the prompt composer and the annotator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Numeric,
    Categorical,
    Datetime,
    Text,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Numeric => "numeric",
            ColumnKind::Categorical => "categorical",
            ColumnKind::Datetime => "datetime",
            ColumnKind::Text => "text",
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Try to read a string as a timestamp.
///
/// Accepted forms: `YYYY-MM-DD`, `YYYY-MM-DD HH:MM`, `YYYY-MM-DD HH:MM:SS`,
/// and RFC 3339 (`YYYY-MM-DDTHH:MM:SS[Z|±hh:mm]`).
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(ts) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(ts);
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M") {
        return Some(ts);
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(text) {
        return Some(ts.naive_utc());
    }
    None
}

/// Try to read a string as a number.
pub fn parse_numeric(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Infer a column kind from observed values.
///
/// Order follows the introspection contract: numeric parse first, then
/// datetime parse, else categorical when the distinct count is small
/// relative to the population, else text. Nulls are ignored; an all-null
/// column reads as text.
pub fn infer_kind(
    values: &[Scalar],
    total_rows: Option<u64>,
    categorical_max_cardinality: usize,
    categorical_row_fraction: f64,
) -> ColumnKind {
    let non_null: Vec<&Scalar> = values.iter().filter(|v| !v.is_null()).collect();
    if non_null.is_empty() {
        return ColumnKind::Text;
    }

    if non_null.iter().all(|v| match v {
        Scalar::Int(_) | Scalar::Float(_) | Scalar::Bool(_) => true,
        Scalar::Text(s) => parse_numeric(s).is_some(),
        _ => false,
    }) {
        return ColumnKind::Numeric;
    }

    if non_null.iter().all(|v| match v {
        Scalar::Timestamp(_) => true,
        Scalar::Text(s) => parse_datetime(s).is_some(),
        _ => false,
    }) {
        return ColumnKind::Datetime;
    }

    let mut distinct: Vec<String> = non_null.iter().map(|v| v.render()).collect();
    distinct.sort();
    distinct.dedup();

    let small_absolute = distinct.len() <= categorical_max_cardinality;
    let small_relative = match total_rows {
        Some(rows) if rows > 0 => {
            (distinct.len() as f64) / (rows as f64) <= categorical_row_fraction
        }
        _ => false,
    };
    if small_absolute || small_relative {
        ColumnKind::Categorical
    } else {
        ColumnKind::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_datetime_forms() {
        assert!(parse_datetime("2024-01-15").is_some());
        assert!(parse_datetime("2024-01-15 09:30").is_some());
        assert!(parse_datetime("2024-01-15 09:30:01").is_some());
        assert!(parse_datetime("2024-01-15T09:30:01Z").is_some());
        assert!(parse_datetime("not a date").is_none());
        assert!(parse_datetime("15/01/2024").is_none());
    }

    #[test]
    fn test_numeric_wins_over_categorical() {
        let values: Vec<Scalar> = vec![
            Scalar::Text("1".into()),
            Scalar::Text("2.5".into()),
            Scalar::Int(3),
        ];
        assert_eq!(infer_kind(&values, Some(100), 20, 0.05), ColumnKind::Numeric);
    }

    #[test]
    fn test_datetime_from_text_samples() {
        let values: Vec<Scalar> = vec![
            Scalar::Text("2024-01-01".into()),
            Scalar::Text("2024-02-01".into()),
            Scalar::Null,
        ];
        assert_eq!(
            infer_kind(&values, Some(100), 20, 0.05),
            ColumnKind::Datetime
        );
    }

    #[test]
    fn test_low_cardinality_is_categorical() {
        let values: Vec<Scalar> = vec![
            Scalar::Text("North".into()),
            Scalar::Text("South".into()),
            Scalar::Text("North".into()),
        ];
        assert_eq!(
            infer_kind(&values, Some(100), 20, 0.05),
            ColumnKind::Categorical
        );
    }

    #[test]
    fn test_high_cardinality_is_text() {
        let values: Vec<Scalar> = (0..50)
            .map(|i| Scalar::Text(format!("customer comment {i}")))
            .collect();
        assert_eq!(infer_kind(&values, Some(50), 20, 0.05), ColumnKind::Text);
    }

    #[test]
    fn test_all_null_is_text() {
        let values = vec![Scalar::Null, Scalar::Null];
        assert_eq!(infer_kind(&values, Some(2), 20, 0.05), ColumnKind::Text);
    }
}
