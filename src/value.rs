//! Scalar values that can be bound into a compiled statement, plus the
//! [`Expression`] escape hatch for emitting raw SQL in a value position.

use std::fmt;

/// A single bindable scalar.
///
/// This is the value half of the builder's IR: every `Value` that ends up in
/// a [`crate::ir::BuilderIr::bindings`] vector is rendered by the connection
/// as a driver-level bound parameter, never interpolated into the SQL text.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Integer(v as i64)
            }
        })*
    };
}
impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Real(v as f64)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}
impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// A binding slot: either a real bound [`Value`], or an [`Expression`]
/// wrapping raw SQL that must be emitted verbatim and never bound.
///
/// Every fluent method that accepts "a value" (`where`, `having`, `insert`,
/// ...) actually accepts a `Bindable`, so callers can drop in
/// `Expression::raw(...)` anywhere a literal would otherwise go.
#[derive(Debug, Clone, PartialEq)]
pub enum Bindable {
    Value(Value),
    Expression(Expression),
}

impl Bindable {
    pub fn is_expression(&self) -> bool {
        matches!(self, Bindable::Expression(_))
    }
}

impl<T: Into<Value>> From<T> for Bindable {
    fn from(v: T) -> Self {
        Bindable::Value(v.into())
    }
}

impl From<Expression> for Bindable {
    fn from(e: Expression) -> Self {
        Bindable::Expression(e)
    }
}

/// A raw SQL fragment marked "emit verbatim, do not bind".
///
/// `Expression` is the builder's only escape hatch for injecting
/// non-parameterized SQL — column expressions, function calls, subquery
/// literals — into a position that would otherwise produce a bound
/// parameter. A grammar emits `self.0` inline; [`crate::builder::clean_bindings`]
/// strips any `Bindable::Expression` out of a binding vector before it
/// reaches the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression(pub String);

impl Expression {
    pub fn raw(sql: impl Into<String>) -> Self {
        Expression(sql.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strips [`Expression`] values out of a binding vector, leaving only real
/// scalar bindings — the result a connection actually binds never contains
/// a raw-SQL fragment.
pub fn clean_bindings(bindings: Vec<Bindable>) -> Vec<Value> {
    bindings
        .into_iter()
        .filter_map(|b| match b {
            Bindable::Value(v) => Some(v),
            Bindable::Expression(_) => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_bindings_drops_expressions() {
        let bindings = vec![
            Bindable::from(1),
            Bindable::from(Expression::raw("NOW()")),
            Bindable::from("x"),
        ];
        let cleaned = clean_bindings(bindings);
        assert_eq!(cleaned, vec![Value::Integer(1), Value::Text("x".into())]);
    }

    #[test]
    fn option_none_is_null() {
        let v: Value = Option::<i32>::None.into();
        assert_eq!(v, Value::Null);
    }
}
