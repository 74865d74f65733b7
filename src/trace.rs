//! Tracing utilities for query and execution observability.
//!
//! Enable the `tracing` feature to emit debug-level events via the `tracing`
//! crate. These macros no-op when the feature is disabled, avoiding `#[cfg]`
//! boilerplate at every call site.

/// Emit a debug-level event for a compiled statement: SQL text and binding
/// count, right before it's handed to a [`crate::external::Connection`].
#[macro_export]
macro_rules! qb_trace_query {
    ($sql:expr, $binding_count:expr) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(sql = %$sql, bindings = $binding_count, "querybuilder.query");
    };
}

/// Emit a debug-level event after a terminal execution completes: statement
/// kind and the row/affected-row count it returned.
#[macro_export]
macro_rules! qb_trace_exec {
    ($kind:literal, $count:expr) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(kind = $kind, count = $count, "querybuilder.exec");
    };
}
