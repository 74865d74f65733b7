//! The collaborator interfaces the core consumes but does not implement:
//! connection, row processor, cache manager, and paginator environment.
//!
//! None of them are executed by anything in this crate — a caller supplies
//! concrete implementations (a real driver, an in-memory cache, ...) and the
//! [`crate::builder::Builder`] only ever holds them behind `Arc<dyn Trait>`.

use crate::error::Result;
use crate::value::{Expression, Value};
use std::collections::HashMap;

/// One result row: an ordered-by-insertion map from column name to value.
///
/// `HashMap` would lose the original column order; an insertion-ordered map
/// isn't in std, so a `Vec` of pairs stands in for it here, matching how the
/// processor and `lists`/`pluck` only ever look values up by name, never by
/// position.
pub type Row = Vec<(String, Value)>;

/// Looks up a field by name in a [`Row`], used throughout the terminal
/// operations (`pluck`, `lists`, aggregates) that extract a single column.
pub fn row_get<'a>(row: &'a Row, column: &str) -> Option<&'a Value> {
    row.iter().find(|(name, _)| name == column).map(|(_, v)| v)
}

/// The opaque failure type `Connection`/`Cache` report at their trait
/// boundary. Keeping this independent of [`crate::error::QueryBuilderError`]
/// means an implementor never needs to know this crate's error enum to
/// report a driver/store failure — the core wraps it as
/// `QueryBuilderError::Connection`/`::Cache` on the way out.
pub type ExternalError = Box<dyn std::error::Error + Send + Sync>;

/// Executes compiled `(sql, bindings)` pairs and reports identity/caching
/// collaborators. Implemented by whatever actually owns a database socket;
/// the core never talks to a database directly.
pub trait Connection: Send + Sync {
    fn select(&self, sql: &str, bindings: &[Value]) -> std::result::Result<Vec<Row>, ExternalError>;
    fn insert(&self, sql: &str, bindings: &[Value]) -> std::result::Result<bool, ExternalError>;
    fn update(&self, sql: &str, bindings: &[Value]) -> std::result::Result<u64, ExternalError>;
    fn delete(&self, sql: &str, bindings: &[Value]) -> std::result::Result<u64, ExternalError>;
    fn statement(&self, sql: &str, bindings: &[Value]) -> std::result::Result<bool, ExternalError>;

    /// Wraps a raw SQL fragment as an [`Expression`] so it bypasses binding.
    fn raw(&self, value: &str) -> Expression {
        Expression::raw(value)
    }

    /// A stable name for this connection, used to derive a cache key when
    /// the caller doesn't supply one explicitly.
    fn name(&self) -> &str;

    /// The cache manager for opportunistic SELECT memoization, if any.
    fn cache_manager(&self) -> Option<&dyn Cache> {
        None
    }

    /// The paginator environment, if any.
    fn paginator(&self) -> Option<&dyn Paginator> {
        None
    }
}

/// Adapts raw rows from the connection into caller-facing shapes.
pub trait Processor: Send + Sync {
    /// Post-processes a freshly selected row set. The default is the
    /// identity transform.
    fn process_select(&self, rows: Vec<Row>) -> Vec<Row> {
        rows
    }

    /// Extracts the generated primary key from an `insertGetId` execution.
    /// `sequence` names the auto-increment column/sequence when the dialect
    /// needs it (Postgres sequences, SQLite `sqlite_sequence`); `None` means
    /// "use the dialect's default".
    fn process_insert_get_id(&self, connection: &dyn Connection, sql: &str, bindings: &[Value], sequence: Option<&str>) -> Result<i64>;
}

/// Default [`Processor`]: identity `process_select`, and
/// `process_insert_get_id` that runs the insert then asks the connection's
/// `select` for `last_insert_rowid()`/`lastval()` is intentionally *not*
/// assumed here — this default simply executes the statement via
/// `Connection::insert` and expects the connection to have been built with a
/// driver capable of reporting the id through `statement`'s return path.
/// Real deployments are expected to supply a driver-specific `Processor`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultProcessor;

impl Processor for DefaultProcessor {
    fn process_insert_get_id(&self, connection: &dyn Connection, sql: &str, bindings: &[Value], _sequence: Option<&str>) -> Result<i64> {
        let rows = connection.select(sql, bindings).map_err(|e| crate::error::QueryBuilderError::Connection(e.to_string()))?;
        match rows.into_iter().next() {
            Some(row) => match row_get(&row, "id") {
                Some(Value::Integer(id)) => Ok(*id),
                _ => Ok(0),
            },
            None => Ok(0),
        }
    }
}

/// A TTL key/value store used opportunistically for SELECT memoization.
/// Failures here must never corrupt builder IR — callers see them only as
/// an `Err` from the terminal operation that tried to use the cache.
pub trait Cache: Send + Sync {
    /// Returns the cached rows for `key` if present and unexpired;
    /// otherwise invokes `thunk`, stores its result for `minutes`, and
    /// returns it. `thunk`'s own failure is this crate's error type (it runs
    /// a real query through the builder); a failure to read or write the
    /// cache store itself is reported as an opaque [`ExternalError`].
    fn remember(&self, key: &str, minutes: u64, thunk: Box<dyn FnOnce() -> Result<Vec<Row>> + '_>) -> std::result::Result<Vec<Row>, ExternalError>;
}

/// Supplies the current page number and packages a fetched slice into a
/// caller-facing paginator value.
pub trait Paginator: Send + Sync {
    fn current_page(&self) -> u64;
    fn make(&self, items: Vec<Row>, total: u64, per_page: u64) -> Pagination;
}

/// The result of `Builder::paginate`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pagination {
    pub items: Vec<Row>,
    pub total: u64,
    pub per_page: u64,
    pub current_page: u64,
}
