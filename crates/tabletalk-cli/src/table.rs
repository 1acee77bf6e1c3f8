//! Aligned text rendering of result sets.

use colored::Colorize;
use tabletalk_core::{ChartRecommendation, ResultSet};

/// Rows shown in the terminal regardless of how many came back.
const DISPLAY_ROW_CAP: usize = 50;

pub fn print_result(result: &ResultSet) {
    if result.columns.is_empty() {
        println!("{}", "(no columns)".dimmed());
        return;
    }

    let shown = result.rows.len().min(DISPLAY_ROW_CAP);
    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.chars().count()).collect();
    let rendered: Vec<Vec<String>> = result.rows[..shown]
        .iter()
        .map(|row| row.iter().map(|v| v.render()).collect())
        .collect();
    for row in &rendered {
        for (index, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(index) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let header: Vec<String> = result
        .columns
        .iter()
        .zip(&widths)
        .map(|(name, &width)| format!("{name:<width$}"))
        .collect();
    println!("{}", header.join("  ").bold());
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    println!("{}", rule.join("  ").dimmed());
    for row in &rendered {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect();
        println!("{}", line.join("  "));
    }

    let mut footer = format!(
        "{} rows in {:.1?}",
        result.row_count, result.elapsed
    );
    if result.rows.len() > shown {
        footer.push_str(&format!(" (showing first {shown})"));
    }
    if result.truncated {
        footer.push_str(" (result truncated at the row ceiling)");
    }
    println!("{}", footer.dimmed());
}

pub fn print_chart_hint(chart: &ChartRecommendation) {
    let axes = match (&chart.x, chart.y.is_empty()) {
        (Some(x), false) => format!(" (x={x}, y={})", chart.y.join(", ")),
        (Some(x), true) => format!(" (x={x})"),
        (None, false) => format!(" (columns: {})", chart.y.join(", ")),
        (None, true) => String::new(),
    };
    println!(
        "{} {} chart{}: {}",
        "chart:".cyan(),
        chart.kind.as_str().bold(),
        axes,
        chart.rationale
    );
}
