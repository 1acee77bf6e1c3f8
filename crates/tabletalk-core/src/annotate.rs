//! Chart recommendation.
//!
//! Pure function from a result set to a recommended visualization. Column
//! kinds are re-inferred from the result values because aggregates produce
//! columns that never existed in the source schema. Ties are broken by
//! column declaration order, so the same result shape always yields the same
//! recommendation.
//!
//! "No recommendation" is a normal terminal state meaning the result is
//! tabular-only, not an error.

use crate::config::EngineConfig;
use crate::execute::ResultSet;
use crate::value::{infer_kind, ColumnKind, Scalar};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartKind {
    Line,
    Bar,
    Scatter,
    Histogram,
    Heatmap,
    /// Only reachable through explicit caller choice, never recommended.
    Pie,
    /// Only reachable through explicit caller choice, never recommended.
    Box,
}

impl ChartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Line => "line",
            ChartKind::Bar => "bar",
            ChartKind::Scatter => "scatter",
            ChartKind::Histogram => "histogram",
            ChartKind::Heatmap => "heatmap",
            ChartKind::Pie => "pie",
            ChartKind::Box => "box",
        }
    }
}

/// A derived, disposable recommendation; recomputed per result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRecommendation {
    pub kind: ChartKind,
    pub x: Option<String>,
    pub y: Vec<String>,
    pub rationale: String,
}

/// Decide a chart for the result, or `None` when it is not plottable.
pub fn recommend(result: &ResultSet, config: &EngineConfig) -> Option<ChartRecommendation> {
    if result.row_count < 2 {
        return None;
    }

    let kinds: Vec<(String, ColumnKind)> = result
        .columns
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let values: Vec<Scalar> = result
                .column_values(index)
                .into_iter()
                .cloned()
                .collect();
            let kind = infer_kind(
                &values,
                Some(result.row_count as u64),
                config.categorical_max_cardinality,
                config.categorical_row_fraction,
            );
            (name.clone(), kind)
        })
        .collect();

    let first = |wanted: ColumnKind| -> Option<&(String, ColumnKind)> {
        kinds.iter().find(|(_, kind)| *kind == wanted)
    };
    let count = |wanted: ColumnKind| kinds.iter().filter(|(_, kind)| *kind == wanted).count();

    let numeric = count(ColumnKind::Numeric);
    let categorical = count(ColumnKind::Categorical);
    let datetime = count(ColumnKind::Datetime);

    if numeric == 0 {
        return None;
    }
    if categorical > config.max_categorical_dims {
        return None;
    }

    // First eligible pairing wins; pairings are tried in a fixed order.
    if datetime >= 1 {
        let x = first(ColumnKind::Datetime)?;
        let y: Vec<String> = kinds
            .iter()
            .filter(|(_, kind)| *kind == ColumnKind::Numeric)
            .map(|(name, _)| name.clone())
            .collect();
        return Some(ChartRecommendation {
            kind: ChartKind::Line,
            x: Some(x.0.clone()),
            rationale: format!("{} over time", y.join(", ")),
            y,
        });
    }

    if categorical >= 1 {
        let x = first(ColumnKind::Categorical)?;
        let y = first(ColumnKind::Numeric)?;
        return Some(ChartRecommendation {
            kind: ChartKind::Bar,
            x: Some(x.0.clone()),
            y: vec![y.0.clone()],
            rationale: format!("{} by {}", y.0, x.0),
        });
    }

    if numeric == 2 {
        let names: Vec<String> = kinds
            .iter()
            .filter(|(_, kind)| *kind == ColumnKind::Numeric)
            .map(|(name, _)| name.clone())
            .collect();
        return Some(ChartRecommendation {
            kind: ChartKind::Scatter,
            x: Some(names[0].clone()),
            y: vec![names[1].clone()],
            rationale: format!("relationship between {} and {}", names[0], names[1]),
        });
    }

    if numeric == 1 {
        if result.row_count < config.histogram_min_rows {
            return None;
        }
        let y = first(ColumnKind::Numeric)?;
        return Some(ChartRecommendation {
            kind: ChartKind::Histogram,
            x: Some(y.0.clone()),
            y: vec![],
            rationale: format!("distribution of {}", y.0),
        });
    }

    // Three or more numeric columns, nothing categorical or datetime.
    let names: Vec<String> = kinds
        .iter()
        .filter(|(_, kind)| *kind == ColumnKind::Numeric)
        .map(|(name, _)| name.clone())
        .collect();
    Some(ChartRecommendation {
        kind: ChartKind::Heatmap,
        x: None,
        rationale: format!("correlations across {} numeric columns", names.len()),
        y: names,
    })
}
