//! End-to-end scenarios exercising the public API through a mock
//! connection, reproducing the documented fluent-API behaviors in black
//! box form (no access to crate-internal items).

use std::sync::{Arc, Mutex};

use querybuilder::prelude::*;

struct MockConnection {
    rows: Mutex<Vec<Row>>,
}

impl MockConnection {
    fn empty() -> Self {
        MockConnection { rows: Mutex::new(Vec::new()) }
    }
}

impl Connection for MockConnection {
    fn select(&self, _sql: &str, _bindings: &[Value]) -> std::result::Result<Vec<Row>, ExternalError> {
        Ok(self.rows.lock().unwrap().clone())
    }
    fn insert(&self, _sql: &str, _bindings: &[Value]) -> std::result::Result<bool, ExternalError> {
        Ok(true)
    }
    fn update(&self, _sql: &str, _bindings: &[Value]) -> std::result::Result<u64, ExternalError> {
        Ok(1)
    }
    fn delete(&self, _sql: &str, _bindings: &[Value]) -> std::result::Result<u64, ExternalError> {
        Ok(1)
    }
    fn statement(&self, _sql: &str, _bindings: &[Value]) -> std::result::Result<bool, ExternalError> {
        Ok(true)
    }
    fn name(&self) -> &str {
        "mock"
    }
}

fn builder() -> Builder {
    Builder::new(Arc::new(MockConnection::empty()), Arc::new(SqliteGrammar), Arc::new(DefaultProcessor))
}

#[test]
fn simple_select() {
    let mut b = builder();
    b.from("users").where_eq("id", 1);
    let (sql, bindings) = b.to_sql().unwrap();
    assert_eq!(sql, "select * from \"users\" where \"id\" = ?");
    assert_eq!(bindings, vec![Value::Integer(1)]);
}

#[test]
fn operator_shortcut() {
    let mut b = builder();
    b.from("users").where_op("name", "Alice", 0);
    let (sql, bindings) = b.to_sql().unwrap();
    assert_eq!(sql, "select * from \"users\" where \"name\" = ?");
    assert_eq!(bindings, vec![Value::Text("Alice".into())]);
}

#[test]
fn batch_insert_preserves_binding_order() {
    let mut b = builder();
    b.from("t");
    let records = vec![
        vec![("a".to_string(), Bindable::from(1)), ("b".to_string(), Bindable::from(2))],
        vec![("a".to_string(), Bindable::from(3)), ("b".to_string(), Bindable::from(4))],
    ];
    assert!(b.insert(records).unwrap());
}

#[test]
fn pagination_preserves_orders() {
    let mut b = builder();
    b.from("t").order_by("x", Direction::Asc);
    b.paginate(10, None).unwrap();
    assert_eq!(b.ir.orders, vec![OrderBy { column: "x".to_string(), direction: Direction::Asc }]);
}

#[test]
fn postgres_placeholders_stay_sequential_across_a_subquery() {
    let mut b = Builder::new(Arc::new(MockConnection::empty()), Arc::new(PostgresGrammar), Arc::new(DefaultProcessor));
    b.from("a").where_eq("x", 1).where_in_sub("id", |q| {
        q.from("b").select(&["a_id"]).where_eq("y", 2);
    });
    let (sql, _) = b.to_sql().unwrap();
    assert!(sql.contains("\"x\" = $1"));
    assert!(sql.contains("\"id\" in (select \"a_id\" from \"b\" where \"y\" = $2)"));
}
