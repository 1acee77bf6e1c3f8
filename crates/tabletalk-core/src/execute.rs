//! Bounded query execution.
//!
//! Runs a sanitized query against the active data source with a row cap and
//! a timeout, and normalizes the returned values. The source handle is
//! checked out for exactly the duration of the query; the guard releases it
//! on every exit path, so a failed or timed-out query never leaks the
//! connection.
//!
//! The adapter enforces the timeout natively where the driver allows it; the
//! engine adds an outer deadline on top so a wedged driver cannot hold the
//! request open. Cancellation is drop-based: abandoning the future discards
//! the in-flight result, and read-only queries have nothing to roll back.

use crate::config::EngineConfig;
use crate::error::{ExecutionFailure, SourceError};
use crate::source::{RawRows, SharedSource};
use crate::value::{parse_datetime, Scalar};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Normalized result of one query. Owned by the caller after return; the
/// engine holds no reference past the handoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Scalar>>,
    pub row_count: usize,
    pub truncated: bool,
    pub elapsed: Duration,
}

impl ResultSet {
    /// Values of one column, by index.
    pub fn column_values(&self, index: usize) -> Vec<&Scalar> {
        self.rows.iter().filter_map(|row| row.get(index)).collect()
    }

    /// One-line summary for history entries and logs.
    pub fn summary(&self) -> String {
        if self.truncated {
            format!("{} rows (truncated)", self.row_count)
        } else {
            format!("{} rows", self.row_count)
        }
    }
}

pub async fn execute(
    source: &SharedSource,
    sanitized_sql: &str,
    config: &EngineConfig,
) -> Result<ResultSet, ExecutionFailure> {
    let max_rows = config.row_ceiling as usize;
    let timeout = config.exec_timeout;
    let source = source.clone();
    let sql = sanitized_sql.to_string();
    let started = Instant::now();

    let work = tokio::task::spawn_blocking(move || {
        let guard = source.checkout();
        // Fetch one extra row so truncation is detectable without a second
        // round trip.
        guard.query(&sql, max_rows + 1, timeout)
    });

    // Outer deadline: adapter timeout plus a grace second for checkout waits.
    let outer = timeout.saturating_add(Duration::from_secs(1));
    let raw = match tokio::time::timeout(outer, work).await {
        Err(_) => return Err(ExecutionFailure::ExecutionTimeout),
        Ok(Err(join_err)) => {
            return Err(ExecutionFailure::ExecutionError(SourceError::QueryFailed(
                join_err.to_string(),
            )))
        }
        Ok(Ok(result)) => result.map_err(classify)?,
    };

    let elapsed = started.elapsed();
    Ok(normalize(raw, max_rows, elapsed))
}

fn classify(err: SourceError) -> ExecutionFailure {
    match err {
        SourceError::Timeout => ExecutionFailure::ExecutionTimeout,
        SourceError::ConnectionLost(_) | SourceError::Unavailable(_) => {
            ExecutionFailure::ConnectionLost
        }
        other => {
            tracing::debug!(error = %other, "query execution failed");
            ExecutionFailure::ExecutionError(other)
        }
    }
}

/// Cap rows, flag truncation, and coerce values into the normalized scalar
/// set. Text columns whose every non-null value reads as a timestamp are
/// promoted to timestamps so the annotator can see datetime axes.
fn normalize(mut raw: RawRows, max_rows: usize, elapsed: Duration) -> ResultSet {
    let truncated = raw.rows.len() > max_rows;
    raw.rows.truncate(max_rows);

    let column_count = raw.columns.len();
    for index in 0..column_count {
        let mut any = false;
        let all_datetime = raw
            .rows
            .iter()
            .filter_map(|row| row.get(index))
            .filter(|v| !v.is_null())
            .all(|v| {
                any = true;
                matches!(v, Scalar::Timestamp(_))
                    || matches!(v, Scalar::Text(s) if parse_datetime(s).is_some())
            });
        if any && all_datetime {
            for row in &mut raw.rows {
                if let Some(cell) = row.get_mut(index) {
                    if let Scalar::Text(text) = cell {
                        if let Some(ts) = parse_datetime(text) {
                            *cell = Scalar::Timestamp(ts);
                        }
                    }
                }
            }
        }
    }

    let row_count = raw.rows.len();
    ResultSet {
        columns: raw.columns,
        rows: raw.rows,
        row_count,
        truncated,
        elapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::source::{DataSource, Dialect, RawTable};

    struct RowsSource {
        rows: usize,
    }

    impl DataSource for RowsSource {
        fn introspect(&self, _n: usize) -> Result<Vec<RawTable>, SourceError> {
            Ok(vec![])
        }

        fn query(
            &self,
            _sql: &str,
            max_rows: usize,
            _timeout: Duration,
        ) -> Result<RawRows, SourceError> {
            let rows = (0..self.rows.min(max_rows))
                .map(|i| vec![Scalar::Int(i as i64)])
                .collect();
            Ok(RawRows {
                columns: vec!["n".to_string()],
                rows,
            })
        }

        fn dialect(&self) -> Dialect {
            Dialect::Generic
        }
    }

    struct FailingSource(fn() -> SourceError);

    impl DataSource for FailingSource {
        fn introspect(&self, _n: usize) -> Result<Vec<RawTable>, SourceError> {
            Ok(vec![])
        }
        fn query(
            &self,
            _sql: &str,
            _max: usize,
            _t: Duration,
        ) -> Result<RawRows, SourceError> {
            Err((self.0)())
        }
        fn dialect(&self) -> Dialect {
            Dialect::Generic
        }
    }

    fn config_with_ceiling(ceiling: u64) -> EngineConfig {
        EngineConfig {
            row_ceiling: ceiling,
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_truncation_at_ceiling() {
        let source = SharedSource::new(Box::new(RowsSource { rows: 10_000 }));
        let result = execute(&source, "SELECT n FROM t", &config_with_ceiling(100))
            .await
            .unwrap();
        assert_eq!(result.row_count, 100);
        assert!(result.truncated);
        assert_eq!(result.rows.len(), 100);
    }

    #[tokio::test]
    async fn test_no_truncation_below_ceiling() {
        let source = SharedSource::new(Box::new(RowsSource { rows: 7 }));
        let result = execute(&source, "SELECT n FROM t", &config_with_ceiling(100))
            .await
            .unwrap();
        assert_eq!(result.row_count, 7);
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_execution_timeout() {
        let source = SharedSource::new(Box::new(FailingSource(|| SourceError::Timeout)));
        let err = execute(&source, "SELECT 1", &EngineConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionFailure::ExecutionTimeout));
    }

    #[tokio::test]
    async fn test_lost_connection_maps_to_connection_lost() {
        let source = SharedSource::new(Box::new(FailingSource(|| {
            SourceError::ConnectionLost("socket closed".into())
        })));
        let err = execute(&source, "SELECT 1", &EngineConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionFailure::ConnectionLost));
    }

    #[test]
    fn test_normalize_promotes_datetime_text() {
        let raw = RawRows {
            columns: vec!["day".to_string(), "note".to_string()],
            rows: vec![
                vec![
                    Scalar::Text("2024-01-01".into()),
                    Scalar::Text("not a date".into()),
                ],
                vec![Scalar::Text("2024-01-02".into()), Scalar::Null],
            ],
        };
        let result = normalize(raw, 100, Duration::ZERO);
        assert!(matches!(result.rows[0][0], Scalar::Timestamp(_)));
        assert!(matches!(result.rows[0][1], Scalar::Text(_)));
    }

    #[test]
    fn test_summary_mentions_truncation() {
        let raw = RawRows {
            columns: vec!["n".to_string()],
            rows: (0..5).map(|i| vec![Scalar::Int(i)]).collect(),
        };
        let result = normalize(raw, 4, Duration::ZERO);
        assert_eq!(result.summary(), "4 rows (truncated)");
    }
}
