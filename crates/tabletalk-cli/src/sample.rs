//! Deterministic sample sales dataset for demos and smoke tests.

use anyhow::{Context, Result};
use std::path::Path;

const PRODUCTS: &[&str] = &["Product A", "Product B", "Product C"];
const REGIONS: &[&str] = &["North", "South", "East", "West"];
const ROWS: usize = 100;

/// Tiny deterministic generator so the sample data is reproducible without
/// pulling in a randomness dependency.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        // Numerical Recipes constants.
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn in_range(&mut self, low: u64, high: u64) -> u64 {
        low + self.next() % (high - low)
    }
}

/// Write `ROWS` rows of daily sales data starting 2024-01-01. Returns the
/// row count.
pub fn write_sample_sales(path: &Path) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("cannot write {}", path.display()))?;
    writer.write_record(["Date", "Product", "Sales", "Region", "Customer Satisfaction"])?;

    let mut rng = Lcg(42);
    let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
    for day in 0..ROWS {
        let date = start + chrono::Days::new(day as u64);
        let product = PRODUCTS[rng.in_range(0, PRODUCTS.len() as u64) as usize];
        let sales = rng.in_range(100, 1_000);
        let region = REGIONS[rng.in_range(0, REGIONS.len() as u64) as usize];
        let satisfaction = 3.0 + rng.in_range(0, 201) as f64 / 100.0;
        writer.write_record([
            date.format("%Y-%m-%d").to_string(),
            product.to_string(),
            sales.to_string(),
            region.to_string(),
            format!("{satisfaction:.2}"),
        ])?;
    }
    writer.flush()?;
    Ok(ROWS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        assert_eq!(write_sample_sales(&a).unwrap(), 100);
        assert_eq!(write_sample_sales(&b).unwrap(), 100);
        assert_eq!(
            std::fs::read_to_string(&a).unwrap(),
            std::fs::read_to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_sample_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.csv");
        write_sample_sales(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Date,Product,Sales,Region,Customer Satisfaction"
        );
        assert_eq!(lines.count(), 100);
    }
}
