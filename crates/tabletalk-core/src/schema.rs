//! Schema introspection.
//!
//! Turns raw schema rows from a data source into an immutable
//! [`SchemaDescription`] snapshot: column names, inferred kinds, nullability,
//! and a handful of sample values per column. The snapshot is rebuilt whenever
//! the active source changes and is consumed by exactly one translation
//! request at a time.

use crate::config::EngineConfig;
use crate::error::{SchemaError, SourceError};
use crate::source::DataSource;
use crate::value::{infer_kind, ColumnKind, Scalar};
use serde::{Deserialize, Serialize};

/// One column in the schema snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub kind: ColumnKind,
    pub nullable: bool,
    /// At most `EngineConfig::sample_values` values from the first rows.
    pub samples: Vec<Scalar>,
}

/// One table in the schema snapshot, columns in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub approx_rows: Option<u64>,
}

/// Immutable snapshot of everything the translation pipeline may reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDescription {
    pub tables: Vec<TableSchema>,
}

impl SchemaDescription {
    /// Case-insensitive table lookup.
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Case-insensitive column lookup across every table.
    pub fn has_column(&self, name: &str) -> bool {
        self.tables
            .iter()
            .any(|t| t.columns.iter().any(|c| c.name.eq_ignore_ascii_case(name)))
    }

    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(|t| t.columns.is_empty())
    }
}

/// Build a schema snapshot from a live source.
///
/// Fails with `SourceUnavailable` when the handle cannot be queried and
/// `EmptySchema` when zero columns are discoverable; the caller reacts by
/// disabling translation, not by crashing.
pub fn introspect(
    source: &dyn DataSource,
    config: &EngineConfig,
) -> Result<SchemaDescription, SchemaError> {
    let raw = source
        .introspect(config.sample_values)
        .map_err(SchemaError::SourceUnavailable)?;

    let tables: Vec<TableSchema> = raw
        .into_iter()
        .map(|table| {
            let approx_rows = table.approx_rows;
            let columns = table
                .columns
                .into_iter()
                .map(|col| {
                    let kind = declared_kind(col.declared_type.as_deref()).unwrap_or_else(|| {
                        infer_kind(
                            &col.samples,
                            approx_rows,
                            config.categorical_max_cardinality,
                            config.categorical_row_fraction,
                        )
                    });
                    let nullable = col.nullable || col.samples.iter().any(Scalar::is_null);
                    let mut samples = col.samples;
                    samples.truncate(config.sample_values);
                    ColumnInfo {
                        name: col.name,
                        kind,
                        nullable,
                        samples,
                    }
                })
                .collect();
            TableSchema {
                name: table.name,
                columns,
                approx_rows,
            }
        })
        .collect();

    let description = SchemaDescription { tables };
    if description.is_empty() {
        return Err(SchemaError::EmptySchema);
    }
    Ok(description)
}

/// Map a declared backend type to a column kind, when the declaration is
/// meaningful. Schemaless sources declare nothing and fall through to
/// sample-based inference.
fn declared_kind(declared: Option<&str>) -> Option<ColumnKind> {
    let declared = declared?.trim().to_ascii_uppercase();
    if declared.is_empty() {
        return None;
    }
    const NUMERIC: &[&str] = &["INT", "REAL", "FLOA", "DOUB", "NUMERIC", "DECIMAL"];
    const DATETIME: &[&str] = &["DATE", "TIME"];
    if NUMERIC.iter().any(|p| declared.contains(p)) {
        return Some(ColumnKind::Numeric);
    }
    if DATETIME.iter().any(|p| declared.contains(p)) {
        return Some(ColumnKind::Datetime);
    }
    if declared.contains("BOOL") {
        return Some(ColumnKind::Categorical);
    }
    // TEXT, BLOB, VARCHAR and friends carry no signal beyond "stringy";
    // let the samples decide between categorical and free text.
    None
}

/// Short summary line for logs and the data-overview display.
pub fn describe(schema: &SchemaDescription) -> String {
    let tables: Vec<String> = schema
        .tables
        .iter()
        .map(|t| {
            format!(
                "{} ({} columns, ~{} rows)",
                t.name,
                t.columns.len(),
                t.approx_rows
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "?".to_string())
            )
        })
        .collect();
    tables.join(", ")
}

impl From<SourceError> for SchemaError {
    fn from(err: SourceError) -> Self {
        SchemaError::SourceUnavailable(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Dialect, RawColumn, RawRows, RawTable};
    use std::time::Duration;

    struct FixtureSource {
        tables: Vec<RawTable>,
    }

    impl DataSource for FixtureSource {
        fn introspect(&self, _sample_rows: usize) -> Result<Vec<RawTable>, SourceError> {
            Ok(self.tables.clone())
        }

        fn query(
            &self,
            _sql: &str,
            _max_rows: usize,
            _timeout: Duration,
        ) -> Result<RawRows, SourceError> {
            Ok(RawRows::default())
        }

        fn dialect(&self) -> Dialect {
            Dialect::Generic
        }
    }

    fn sales_table() -> RawTable {
        RawTable {
            name: "sales".to_string(),
            columns: vec![
                RawColumn {
                    name: "region".to_string(),
                    declared_type: None,
                    nullable: false,
                    samples: vec![
                        Scalar::Text("West".into()),
                        Scalar::Text("East".into()),
                        Scalar::Text("West".into()),
                    ],
                },
                RawColumn {
                    name: "sales_amount".to_string(),
                    declared_type: Some("REAL".to_string()),
                    nullable: false,
                    samples: vec![Scalar::Float(120.0), Scalar::Float(80.5)],
                },
                RawColumn {
                    name: "sold_on".to_string(),
                    declared_type: None,
                    nullable: true,
                    samples: vec![Scalar::Text("2024-03-01".into()), Scalar::Null],
                },
            ],
            approx_rows: Some(100),
        }
    }

    #[test]
    fn test_introspect_infers_kinds() {
        let source = FixtureSource {
            tables: vec![sales_table()],
        };
        let schema = introspect(&source, &EngineConfig::default()).unwrap();
        let table = schema.table("SALES").expect("case-insensitive lookup");
        assert_eq!(table.columns[0].kind, ColumnKind::Categorical);
        assert_eq!(table.columns[1].kind, ColumnKind::Numeric);
        assert_eq!(table.columns[2].kind, ColumnKind::Datetime);
        assert!(table.columns[2].nullable);
    }

    #[test]
    fn test_empty_schema_is_an_error() {
        let source = FixtureSource { tables: vec![] };
        let err = introspect(&source, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, SchemaError::EmptySchema));
    }

    #[test]
    fn test_source_failure_maps_to_unavailable() {
        struct Broken;
        impl DataSource for Broken {
            fn introspect(&self, _n: usize) -> Result<Vec<RawTable>, SourceError> {
                Err(SourceError::Unavailable("gone".into()))
            }
            fn query(
                &self,
                _sql: &str,
                _max: usize,
                _t: Duration,
            ) -> Result<RawRows, SourceError> {
                unreachable!()
            }
            fn dialect(&self) -> Dialect {
                Dialect::Generic
            }
        }
        let err = introspect(&Broken, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, SchemaError::SourceUnavailable(_)));
    }

    #[test]
    fn test_samples_are_capped() {
        let mut table = sales_table();
        table.columns[0].samples = (0..10).map(|i| Scalar::Text(format!("r{i}"))).collect();
        let source = FixtureSource {
            tables: vec![table],
        };
        let schema = introspect(&source, &EngineConfig::default()).unwrap();
        assert_eq!(schema.tables[0].columns[0].samples.len(), 5);
    }
}
