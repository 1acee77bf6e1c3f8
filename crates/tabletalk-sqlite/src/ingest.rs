//! CSV ingestion into a SQLite table.
//!
//! Headers become column names (spaces normalized to underscores) and
//! per-column types are sniffed from the data: all-integer columns land as
//! INTEGER, numeric columns as REAL, everything else as TEXT. Empty cells
//! load as NULL.

use crate::{quote_ident, SqliteSource};
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use std::path::Path;
use tabletalk_core::SourceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SniffedType {
    Integer,
    Real,
    Text,
}

impl SniffedType {
    fn sql(&self) -> &'static str {
        match self {
            SniffedType::Integer => "INTEGER",
            SniffedType::Real => "REAL",
            SniffedType::Text => "TEXT",
        }
    }
}

impl SqliteSource {
    /// Load a CSV file into `table`, replacing any existing table of that
    /// name. Returns the number of rows loaded.
    pub fn ingest_csv(&self, path: impl AsRef<Path>, table: &str) -> Result<usize, SourceError> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| SourceError::Unavailable(format!("cannot read {}: {e}", path.display())))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(ingest_error)?
            .iter()
            .map(normalize_header)
            .collect();
        if headers.is_empty() {
            return Err(SourceError::QueryFailed("CSV file has no header row".to_string()));
        }

        let mut records: Vec<csv::StringRecord> = Vec::new();
        for record in reader.records() {
            records.push(record.map_err(ingest_error)?);
        }

        let types: Vec<SniffedType> = (0..headers.len())
            .map(|index| sniff_column(&records, index))
            .collect();

        let column_defs: Vec<String> = headers
            .iter()
            .zip(&types)
            .map(|(name, sniffed)| format!("{} {}", quote_ident(name), sniffed.sql()))
            .collect();
        let quoted_table = quote_ident(table);
        self.execute_batch(&format!(
            "DROP TABLE IF EXISTS {quoted_table};\n\
             CREATE TABLE {quoted_table} ({});",
            column_defs.join(", ")
        ))?;

        let placeholders = vec!["?"; headers.len()].join(", ");
        let insert_sql = format!("INSERT INTO {quoted_table} VALUES ({placeholders})");
        let mut inserted = 0usize;
        {
            let conn = self.connection();
            let mut stmt = conn
                .prepare(&insert_sql)
                .map_err(|e| SourceError::QueryFailed(e.to_string()))?;
            for record in &records {
                let values: Vec<Value> = (0..headers.len())
                    .map(|index| cell_value(record.get(index), types[index]))
                    .collect();
                stmt.execute(params_from_iter(values))
                    .map_err(|e| SourceError::QueryFailed(e.to_string()))?;
                inserted += 1;
            }
        }

        tracing::info!(table, rows = inserted, "loaded CSV");
        Ok(inserted)
    }
}

fn ingest_error(err: csv::Error) -> SourceError {
    SourceError::QueryFailed(format!("CSV parse error: {err}"))
}

fn normalize_header(header: &str) -> String {
    let cleaned: String = header
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    if cleaned.is_empty() {
        "column".to_string()
    } else {
        cleaned
    }
}

fn sniff_column(records: &[csv::StringRecord], index: usize) -> SniffedType {
    let mut seen = false;
    let mut all_integer = true;
    let mut all_numeric = true;
    for record in records {
        let Some(cell) = record.get(index) else { continue };
        if cell.is_empty() {
            continue;
        }
        seen = true;
        if cell.parse::<i64>().is_err() {
            all_integer = false;
        }
        if cell.parse::<f64>().map(|v| v.is_finite()).unwrap_or(false) {
            continue;
        }
        all_numeric = false;
    }
    if !seen {
        SniffedType::Text
    } else if all_integer {
        SniffedType::Integer
    } else if all_numeric {
        SniffedType::Real
    } else {
        SniffedType::Text
    }
}

fn cell_value(cell: Option<&str>, sniffed: SniffedType) -> Value {
    let Some(cell) = cell else { return Value::Null };
    if cell.is_empty() {
        return Value::Null;
    }
    match sniffed {
        SniffedType::Integer => cell
            .parse::<i64>()
            .map(Value::Integer)
            .unwrap_or(Value::Null),
        SniffedType::Real => cell.parse::<f64>().map(Value::Real).unwrap_or(Value::Null),
        SniffedType::Text => Value::Text(cell.to_string()),
    }
}
