use super::Grammar;

/// MySQL dialect: backtick-quoted identifiers, anonymous `?` placeholders,
/// and `insert ignore` (no `or`, unlike SQLite's spelling).
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlGrammar;

impl Grammar for MySqlGrammar {
    fn wrap_segment(&self, segment: &str) -> String {
        format!("`{}`", segment.replace('`', "``"))
    }

    fn placeholder(&self, _n: usize) -> String {
        "?".to_string()
    }

    fn insert_ignore_keyword(&self) -> &'static str {
        "ignore"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_with_backticks() {
        let g = MySqlGrammar;
        assert_eq!(g.wrap("users.name"), "`users`.`name`");
    }

    #[test]
    fn insert_ignore_splices_keyword() {
        let g = MySqlGrammar;
        assert_eq!(g.render_insert_ignore("insert into `t` (`a`) values (?)"), "insert ignore into `t` (`a`) values (?)");
    }
}
