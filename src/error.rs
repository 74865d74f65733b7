//! Error types for the query builder core.

use thiserror::Error;

/// Core error type for query-builder operations.
///
/// Distinguishes dynamic-dispatch failures, malformed arguments, and opaque
/// wrappers around whatever the connection or cache collaborator reports.
/// The core never retries and never swallows a collaborator failure — it
/// wraps and returns it.
#[derive(Debug, Error)]
pub enum QueryBuilderError {
    /// A dynamic `where_*` method name didn't parse into a column/connector
    /// sequence.
    #[error("unknown dynamic where method: {0}")]
    UnknownMethod(String),

    /// An argument violated a documented precondition.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Compilation was attempted before `from` was set.
    #[error("query has no `from` table set")]
    MissingFromClause,

    /// Opaque wrapper around a connection-level execution failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// Opaque wrapper around a cache-manager failure.
    #[error("cache error: {0}")]
    Cache(String),
}

/// Result type for query-builder operations.
pub type Result<T> = std::result::Result<T, QueryBuilderError>;
