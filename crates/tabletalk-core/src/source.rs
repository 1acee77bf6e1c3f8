//! The data-source capability.
//!
//! The core treats the backing store as an opaque collaborator: anything that
//! can report raw schema rows and run a bounded query can plug in, whether it
//! is a file-backed table engine or a client/server database. Adapters live
//! outside this crate.

use crate::error::SourceError;
use crate::value::Scalar;
use std::sync::Arc;
use std::time::Duration;

/// SQL variant accepted by the active data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Generic,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "SQLite",
            Dialect::Generic => "standard SQL",
        }
    }
}

/// One column as reported by the source, before type inference.
///
/// `declared_type` is whatever the backend says (possibly nothing at all for
/// schemaless sources); `samples` are values from the first few rows.
#[derive(Debug, Clone)]
pub struct RawColumn {
    pub name: String,
    pub declared_type: Option<String>,
    pub nullable: bool,
    pub samples: Vec<Scalar>,
}

/// One table as reported by the source.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub name: String,
    pub columns: Vec<RawColumn>,
    pub approx_rows: Option<u64>,
}

/// Rows returned from a query, in source order.
#[derive(Debug, Clone, Default)]
pub struct RawRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Scalar>>,
}

/// Capability interface every backend adapter implements.
///
/// `query` must honor `max_rows` and `timeout` natively where the driver
/// allows it; the execution engine wraps the call in an outer deadline
/// regardless, so a wedged driver cannot hold a request open.
pub trait DataSource: Send {
    /// Raw schema rows for every user table, in declaration order.
    fn introspect(&self, sample_rows: usize) -> Result<Vec<RawTable>, SourceError>;

    /// Run one read statement, returning at most `max_rows` rows.
    fn query(&self, sql: &str, max_rows: usize, timeout: Duration)
        -> Result<RawRows, SourceError>;

    fn dialect(&self) -> Dialect;

    /// Re-establish a lost connection. Adapters that cannot do this return
    /// the error unchanged and the request stays terminal.
    fn reconnect(&mut self) -> Result<(), SourceError> {
        Err(SourceError::Unavailable(
            "this data source cannot reconnect".to_string(),
        ))
    }
}

/// Shared handle to the active data source.
///
/// The handle is a shared resource: the execution engine checks it out for
/// the duration of one query via the inner lock, and the lock guard
/// guarantees release even when the query fails or times out.
#[derive(Clone)]
pub struct SharedSource {
    inner: Arc<parking_lot::Mutex<Box<dyn DataSource>>>,
}

impl SharedSource {
    pub fn new(source: Box<dyn DataSource>) -> Self {
        Self {
            inner: Arc::new(parking_lot::Mutex::new(source)),
        }
    }

    /// Scoped checkout of the underlying source.
    pub fn checkout(&self) -> parking_lot::MutexGuard<'_, Box<dyn DataSource>> {
        self.inner.lock()
    }
}

impl std::fmt::Debug for SharedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSource").finish_non_exhaustive()
    }
}
