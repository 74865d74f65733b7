use super::Grammar;
use crate::value::Value;

/// SQLite dialect: double-quoted identifiers, anonymous `?` placeholders,
/// `insert or ignore`, and a `truncate` that's really "delete everything and
/// reset the autoincrement sequence" since SQLite has no `TRUNCATE` keyword.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteGrammar;

impl Grammar for SqliteGrammar {
    fn wrap_segment(&self, segment: &str) -> String {
        format!("\"{}\"", segment.replace('"', "\"\""))
    }

    fn placeholder(&self, _n: usize) -> String {
        "?".to_string()
    }

    fn insert_ignore_keyword(&self) -> &'static str {
        "or ignore"
    }

    fn compile_truncate(&self, table: &str) -> Vec<(String, Vec<Value>)> {
        vec![
            (format!("delete from {}", self.wrap(table)), Vec::new()),
            (
                "delete from sqlite_sequence where name = ?".to_string(),
                vec![Value::Text(table.to_string())],
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_dotted_identifier() {
        let g = SqliteGrammar;
        assert_eq!(g.wrap("users.id"), "\"users\".\"id\"");
        assert_eq!(g.wrap("*"), "*");
        assert_eq!(g.wrap("count(*)"), "count(*)");
    }

    #[test]
    fn placeholder_is_always_anonymous() {
        let g = SqliteGrammar;
        assert_eq!(g.placeholder(1), "?");
        assert_eq!(g.placeholder(7), "?");
    }
}
