use super::Grammar;
use crate::error::Result;
use crate::value::Bindable;

/// PostgreSQL dialect: double-quoted identifiers like SQLite, but
/// positional `$1, $2, ...` placeholders instead of anonymous `?`, and
/// `on conflict do nothing` instead of an `insert ignore` keyword since
/// Postgres has no such keyword.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresGrammar;

impl Grammar for PostgresGrammar {
    fn wrap_segment(&self, segment: &str) -> String {
        format!("\"{}\"", segment.replace('"', "\"\""))
    }

    fn placeholder(&self, n: usize) -> String {
        format!("${n}")
    }

    fn render_insert_ignore(&self, base_sql: &str) -> String {
        format!("{base_sql} on conflict do nothing")
    }

    /// Postgres has no last-insert-id API, so the generated key is obtained
    /// with a `returning` clause instead of a follow-up query.
    fn compile_insert_get_id(&self, table: &str, record: &[(String, Bindable)], sequence: Option<&str>) -> Result<String> {
        let base = self.compile_insert(table, std::slice::from_ref(&record.to_vec()))?;
        Ok(format!("{} returning {}", base, self.wrap(sequence.unwrap_or("id"))))
    }

    fn compile_insert_ignore_get_id(&self, table: &str, record: &[(String, Bindable)], sequence: Option<&str>) -> Result<String> {
        let base = self.compile_insert_ignore(table, std::slice::from_ref(&record.to_vec()))?;
        Ok(format!("{} returning {}", base, self.wrap(sequence.unwrap_or("id"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_sequential() {
        let g = PostgresGrammar;
        assert_eq!(g.placeholder(1), "$1");
        assert_eq!(g.placeholder(2), "$2");
    }

    #[test]
    fn insert_get_id_appends_returning() {
        let g = PostgresGrammar;
        let record = vec![("name".to_string(), Bindable::from("Alice"))];
        let sql = g.compile_insert_get_id("users", &record, None).unwrap();
        assert_eq!(sql, "insert into \"users\" (\"name\") values ($1) returning \"id\"");
    }

    #[test]
    fn insert_ignore_uses_on_conflict() {
        let g = PostgresGrammar;
        assert_eq!(
            g.render_insert_ignore("insert into \"t\" (\"a\") values ($1)"),
            "insert into \"t\" (\"a\") values ($1) on conflict do nothing"
        );
    }
}
