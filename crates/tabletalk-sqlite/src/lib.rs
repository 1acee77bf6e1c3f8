//! SQLite adapter: file-backed or in-memory tables behind the
//! [`DataSource`] capability.
//!
//! The execution timeout is enforced natively with SQLite's interrupt
//! handle: a watchdog thread interrupts the connection when the deadline
//! passes, and the interrupted statement surfaces as a timeout rather than a
//! generic failure.

pub mod ingest;

use rusqlite::ffi::ErrorCode;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use tabletalk_core::{DataSource, Dialect, RawColumn, RawRows, RawTable, Scalar, SourceError};

pub struct SqliteSource {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteSource {
    /// Open a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(open_error)?;
        Ok(Self {
            conn,
            path: Some(path),
        })
    }

    /// Fresh in-memory database, typically populated via CSV ingestion.
    pub fn in_memory() -> Result<Self, SourceError> {
        let conn = Connection::open_in_memory().map_err(open_error)?;
        Ok(Self { conn, path: None })
    }

    /// Run setup statements (table creation, demo data). This is a loading
    /// path for callers that own the database; user queries go through
    /// [`DataSource::query`] and its validation pipeline instead.
    pub fn execute_batch(&self, sql: &str) -> Result<(), SourceError> {
        self.conn.execute_batch(sql).map_err(query_error)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn table_names(&self) -> Result<Vec<String>, SourceError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY rowid",
            )
            .map_err(query_error)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(query_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_error)?;
        Ok(names)
    }

    fn introspect_table(&self, name: &str, sample_rows: usize) -> Result<RawTable, SourceError> {
        let quoted = quote_ident(name);

        let mut columns: Vec<RawColumn> = Vec::new();
        {
            let mut stmt = self
                .conn
                .prepare(&format!("PRAGMA table_info({quoted})"))
                .map_err(query_error)?;
            let infos = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>("name")?,
                        row.get::<_, Option<String>>("type")?,
                        row.get::<_, i64>("notnull")?,
                    ))
                })
                .map_err(query_error)?;
            for info in infos {
                let (name, declared_type, notnull) = info.map_err(query_error)?;
                columns.push(RawColumn {
                    name,
                    declared_type: declared_type.filter(|t| !t.is_empty()),
                    nullable: notnull == 0,
                    samples: Vec::new(),
                });
            }
        }

        let approx_rows: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {quoted}"), [], |row| {
                row.get(0)
            })
            .map_err(query_error)?;

        if sample_rows > 0 && !columns.is_empty() {
            let mut stmt = self
                .conn
                .prepare(&format!("SELECT * FROM {quoted} LIMIT {sample_rows}"))
                .map_err(query_error)?;
            let column_count = stmt.column_count();
            let mut rows = stmt.query([]).map_err(query_error)?;
            while let Some(row) = rows.next().map_err(query_error)? {
                for index in 0..column_count.min(columns.len()) {
                    let value = row.get_ref(index).map_err(query_error)?;
                    columns[index].samples.push(scalar_from(value));
                }
            }
        }

        Ok(RawTable {
            name: name.to_string(),
            columns,
            approx_rows: Some(approx_rows.max(0) as u64),
        })
    }
}

impl DataSource for SqliteSource {
    fn introspect(&self, sample_rows: usize) -> Result<Vec<RawTable>, SourceError> {
        let names = self.table_names()?;
        names
            .iter()
            .map(|name| self.introspect_table(name, sample_rows))
            .collect()
    }

    fn query(
        &self,
        sql: &str,
        max_rows: usize,
        timeout: Duration,
    ) -> Result<RawRows, SourceError> {
        let handle = self.conn.get_interrupt_handle();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let watchdog = std::thread::spawn(move || {
            if let Err(mpsc::RecvTimeoutError::Timeout) = done_rx.recv_timeout(timeout) {
                handle.interrupt();
            }
        });

        let result = self.run_query(sql, max_rows);

        drop(done_tx);
        let _ = watchdog.join();
        result
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn reconnect(&mut self) -> Result<(), SourceError> {
        match &self.path {
            Some(path) => {
                tracing::info!(path = %path.display(), "reopening sqlite connection");
                self.conn = Connection::open(path).map_err(open_error)?;
                Ok(())
            }
            None => Err(SourceError::Unavailable(
                "in-memory database cannot be reopened".to_string(),
            )),
        }
    }
}

impl SqliteSource {
    fn run_query(&self, sql: &str, max_rows: usize) -> Result<RawRows, SourceError> {
        let mut stmt = self.conn.prepare(sql).map_err(query_error)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let column_count = columns.len();

        let mut out = RawRows {
            columns,
            rows: Vec::new(),
        };
        let mut rows = stmt.query([]).map_err(query_error)?;
        while let Some(row) = rows.next().map_err(query_error)? {
            let mut values = Vec::with_capacity(column_count);
            for index in 0..column_count {
                values.push(scalar_from(row.get_ref(index).map_err(query_error)?));
            }
            out.rows.push(values);
            if out.rows.len() >= max_rows {
                break;
            }
        }
        Ok(out)
    }
}

fn scalar_from(value: ValueRef<'_>) -> Scalar {
    match value {
        ValueRef::Null => Scalar::Null,
        ValueRef::Integer(v) => Scalar::Int(v),
        ValueRef::Real(v) => Scalar::Float(v),
        ValueRef::Text(bytes) => Scalar::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Scalar::Text(format!("<blob {} bytes>", bytes.len())),
    }
}

/// Double-quote an identifier for SQLite.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn open_error(err: rusqlite::Error) -> SourceError {
    SourceError::Unavailable(err.to_string())
}

fn query_error(err: rusqlite::Error) -> SourceError {
    if let rusqlite::Error::SqliteFailure(ffi_err, message) = &err {
        return match ffi_err.code {
            ErrorCode::OperationInterrupted => SourceError::Timeout,
            ErrorCode::CannotOpen | ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt => {
                SourceError::ConnectionLost(
                    message.clone().unwrap_or_else(|| ffi_err.to_string()),
                )
            }
            _ => SourceError::QueryFailed(err.to_string()),
        };
    }
    SourceError::QueryFailed(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_source() -> SqliteSource {
        let source = SqliteSource::in_memory().unwrap();
        source
            .execute_batch(
                "CREATE TABLE sales (
                     region TEXT NOT NULL,
                     sales_amount REAL NOT NULL,
                     sold_on TEXT
                 );
                 INSERT INTO sales VALUES
                     ('West', 12000.0, '2024-01-01'),
                     ('East', 9500.0, '2024-01-02'),
                     ('West', 400.5, NULL);",
            )
            .unwrap();
        source
    }

    #[test]
    fn test_introspect_reports_columns_and_rows() {
        let source = sample_source();
        let tables = source.introspect(5).unwrap();
        assert_eq!(tables.len(), 1);
        let table = &tables[0];
        assert_eq!(table.name, "sales");
        assert_eq!(table.approx_rows, Some(3));
        assert_eq!(table.columns.len(), 3);
        assert_eq!(table.columns[0].name, "region");
        assert_eq!(table.columns[0].declared_type.as_deref(), Some("TEXT"));
        assert!(!table.columns[0].nullable);
        assert!(table.columns[2].nullable);
        assert_eq!(table.columns[0].samples.len(), 3);
    }

    #[test]
    fn test_query_maps_values() {
        let source = sample_source();
        let rows = source
            .query(
                "SELECT region, sales_amount FROM sales ORDER BY sales_amount DESC",
                10,
                Duration::from_secs(5),
            )
            .unwrap();
        assert_eq!(rows.columns, vec!["region", "sales_amount"]);
        assert_eq!(rows.rows.len(), 3);
        assert_eq!(rows.rows[0][0], Scalar::Text("West".to_string()));
        assert_eq!(rows.rows[0][1], Scalar::Float(12000.0));
    }

    #[test]
    fn test_query_respects_max_rows() {
        let source = sample_source();
        let rows = source
            .query("SELECT region FROM sales", 2, Duration::from_secs(5))
            .unwrap();
        assert_eq!(rows.rows.len(), 2);
    }

    #[test]
    fn test_runaway_query_is_interrupted() {
        let source = sample_source();
        let err = source
            .query(
                "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
                 SELECT COUNT(*) FROM c",
                10,
                Duration::from_millis(50),
            )
            .unwrap_err();
        assert!(matches!(err, SourceError::Timeout));
    }

    #[test]
    fn test_syntax_error_is_query_failed() {
        let source = sample_source();
        let err = source
            .query("SELECT nope FROM nothing", 10, Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, SourceError::QueryFailed(_)));
    }

    #[test]
    fn test_file_source_reconnects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let mut source = SqliteSource::open(&path).unwrap();
        source
            .execute_batch("CREATE TABLE t (n INTEGER); INSERT INTO t VALUES (1);")
            .unwrap();
        source.reconnect().unwrap();
        let rows = source
            .query("SELECT n FROM t", 10, Duration::from_secs(5))
            .unwrap();
        assert_eq!(rows.rows.len(), 1);
    }

    #[test]
    fn test_in_memory_cannot_reconnect() {
        let mut source = SqliteSource::in_memory().unwrap();
        assert!(matches!(
            source.reconnect(),
            Err(SourceError::Unavailable(_))
        ));
    }
}
