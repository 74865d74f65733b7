//! [`JoinClause`]: the small sub-builder that accumulates a single join's
//! ON-predicate conjunctions.

use crate::value::Bindable;

/// The join kind, compiled by a [`crate::grammar::Grammar`] into the
/// matching SQL keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Cross,
}

/// One `first <op> second` entry inside a join's ON clause.
///
/// When `is_where` is true, `second` was supplied as a bound value (via
/// [`JoinClause::where_on`]) rather than a column reference, and the
/// grammar must emit a placeholder and push `second`'s value into the
/// parent builder's bindings instead of wrapping it as an identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinCondition {
    pub first: String,
    pub operator: String,
    pub second: JoinOperand,
    pub conjunction: crate::ir::Conjunction,
    pub is_where: bool,
}

/// The right-hand side of a join condition: either another column
/// reference, or — when added via `where_on` — a bindable value.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinOperand {
    Column(String),
    Bound(Bindable),
}

/// A sub-builder used by the join-with-callback form of the fluent API.
///
/// Owns a join `kind`, a target `table`, and an ordered sequence of ON
/// conditions. Binding append order follows condition insertion order, and
/// those bindings are merged into the enclosing [`crate::builder::Builder`]
/// at the point the finished `JoinClause` is pushed onto `joins`.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub kind: JoinType,
    pub table: String,
    pub conditions: Vec<JoinCondition>,
    pub(crate) bindings: Vec<Bindable>,
}

impl JoinClause {
    pub fn new(kind: JoinType, table: impl Into<String>) -> Self {
        JoinClause {
            kind,
            table: table.into(),
            conditions: Vec::new(),
            bindings: Vec::new(),
        }
    }

    /// Adds an `and`-joined column-to-column condition.
    pub fn on(&mut self, first: impl Into<String>, operator: impl Into<String>, second: impl Into<String>) -> &mut Self {
        self.push(first, operator, JoinOperand::Column(second.into()), crate::ir::Conjunction::And, false)
    }

    /// Adds an `or`-joined column-to-column condition.
    pub fn or_on(&mut self, first: impl Into<String>, operator: impl Into<String>, second: impl Into<String>) -> &mut Self {
        self.push(first, operator, JoinOperand::Column(second.into()), crate::ir::Conjunction::Or, false)
    }

    /// Adds a condition whose right-hand side is a bound value rather than a
    /// column reference; the value is appended to `bindings` in insertion
    /// order.
    pub fn where_on(
        &mut self,
        first: impl Into<String>,
        operator: impl Into<String>,
        second: impl Into<Bindable>,
        conjunction: crate::ir::Conjunction,
    ) -> &mut Self {
        let second = second.into();
        self.bindings.push(second.clone());
        self.push(first, operator, JoinOperand::Bound(second), conjunction, true)
    }

    fn push(
        &mut self,
        first: impl Into<String>,
        operator: impl Into<String>,
        second: JoinOperand,
        conjunction: crate::ir::Conjunction,
        is_where: bool,
    ) -> &mut Self {
        self.conditions.push(JoinCondition {
            first: first.into(),
            operator: operator.into(),
            second,
            conjunction,
            is_where,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Conjunction;

    #[test]
    fn on_and_or_on_append_in_order() {
        let mut join = JoinClause::new(JoinType::Left, "contacts");
        join.on("users.id", "=", "contacts.user_id");
        join.or_on("users.email", "=", "contacts.email");
        assert_eq!(join.conditions.len(), 2);
        assert_eq!(join.conditions[0].conjunction, Conjunction::And);
        assert_eq!(join.conditions[1].conjunction, Conjunction::Or);
        assert!(join.bindings.is_empty());
    }

    #[test]
    fn where_on_binds_value() {
        let mut join = JoinClause::new(JoinType::Inner, "contacts");
        join.where_on("contacts.type", "=", 1, Conjunction::And);
        assert_eq!(join.bindings.len(), 1);
        assert!(join.conditions[0].is_where);
    }
}
