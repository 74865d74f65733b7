//! The grammar: a family of pure functions from builder IR to SQL text.
//!
//! [`Grammar`] is one trait with one struct per dialect, overriding only the
//! handful of methods that actually differ — identifier quoting, placeholder
//! style, and the `INSERT ... OR IGNORE` / `INSERT IGNORE` spelling — while
//! the shared traversal logic lives once in this module as default trait
//! methods.

mod compile;
mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MySqlGrammar;
pub use postgres::PostgresGrammar;
pub use sqlite::SqliteGrammar;

use crate::error::Result;
use crate::ir::BuilderIr;
use crate::value::{Bindable, Value};

/// Compiles a [`BuilderIr`] into dialect-specific SQL.
///
/// Every `compile_*` method is a pure function of its inputs: same IR, same
/// output, every time. Traversal order is fixed (select/aggregate → from →
/// joins → wheres → groups → havings → orders → limit/offset → unions) and
/// each section is omitted entirely when its IR field is unset.
pub trait Grammar: Send + Sync {
    /// Quotes a single unqualified identifier segment (no dots).
    fn wrap_segment(&self, segment: &str) -> String;

    /// Emits the placeholder for the `n`th (1-based) binding. SQLite/MySQL
    /// always emit an anonymous `?`; Postgres emits `$n`.
    fn placeholder(&self, n: usize) -> String;

    /// The dialect's "insert, ignore duplicate-key conflicts" keyword,
    /// spliced into a plain `insert into` statement by the default
    /// [`Grammar::render_insert_ignore`]. SQLite and MySQL can express this
    /// as a keyword; Postgres cannot (it needs `on conflict do nothing`
    /// instead), so `PostgresGrammar` overrides `render_insert_ignore`
    /// wholesale rather than this method.
    fn insert_ignore_keyword(&self) -> &'static str {
        "or ignore"
    }

    /// Rewrites a plain `insert into ...` statement into its "ignore
    /// duplicates" form. Default: splice [`Grammar::insert_ignore_keyword`]
    /// in after `insert`.
    fn render_insert_ignore(&self, base_sql: &str) -> String {
        base_sql.replacen("insert into", &format!("insert {} into", self.insert_ignore_keyword()), 1)
    }

    /// Quotes a possibly-dotted identifier (`table.column`), leaving `*` and
    /// anything containing parentheses (a raw function-call expression)
    /// unquoted.
    fn wrap(&self, identifier: &str) -> String {
        if identifier == "*" || identifier.contains('(') {
            return identifier.to_string();
        }
        identifier
            .split('.')
            .map(|seg| if seg == "*" { seg.to_string() } else { self.wrap_segment(seg) })
            .collect::<Vec<_>>()
            .join(".")
    }

    fn compile_select(&self, ir: &BuilderIr) -> Result<String> {
        compile::compile_select(self, ir)
    }

    fn compile_insert(&self, table: &str, records: &[Vec<(String, Bindable)>]) -> Result<String> {
        compile::compile_insert(self, table, records, false)
    }

    fn compile_insert_get_id(
        &self,
        table: &str,
        record: &[(String, Bindable)],
        _sequence: Option<&str>,
    ) -> Result<String> {
        compile::compile_insert(self, table, std::slice::from_ref(&record.to_vec()), false)
    }

    fn compile_insert_ignore(&self, table: &str, records: &[Vec<(String, Bindable)>]) -> Result<String> {
        compile::compile_insert(self, table, records, true)
    }

    fn compile_insert_ignore_get_id(
        &self,
        table: &str,
        record: &[(String, Bindable)],
        _sequence: Option<&str>,
    ) -> Result<String> {
        compile::compile_insert(self, table, std::slice::from_ref(&record.to_vec()), true)
    }

    fn compile_update(&self, ir: &BuilderIr, values: &[(String, Bindable)]) -> Result<String> {
        compile::compile_update(self, ir, values)
    }

    fn compile_delete(&self, ir: &BuilderIr) -> Result<String> {
        compile::compile_delete(self, ir)
    }

    /// Returns one `(sql, bindings)` pair per statement the truncate
    /// operation needs (e.g. a sequence reset followed by the truncate
    /// itself). The default grammars below all emit a single statement.
    fn compile_truncate(&self, table: &str) -> Vec<(String, Vec<Value>)> {
        vec![(format!("truncate table {}", self.wrap(table)), Vec::new())]
    }
}
