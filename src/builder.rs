//! The fluent `Builder`: owns clause IR, exposes the chainable API, and
//! coordinates compilation through a [`Grammar`] and execution through a
//! [`Connection`].

use std::sync::Arc;

use crate::error::{QueryBuilderError, Result};
use crate::external::{row_get, Cache, Connection, Paginator, Pagination, Processor, Row};
use crate::grammar::Grammar;
use crate::ir::{Aggregate, BuilderIr, Conjunction, Direction, HavingPredicate, OrderBy, UnionBranch, WherePredicate};
use crate::join::{JoinClause, JoinType};
use crate::value::{clean_bindings, Bindable, Expression, Value};

/// One column/value pair contributed to an `insert` or `update` statement.
/// Column order here is the order `insert`/`update` iterate when flattening
/// values into bindings.
pub type Record = Vec<(String, Bindable)>;

const KNOWN_OPERATORS: &[&str] = &["=", "<", ">", "<=", ">=", "<>", "!=", "like", "not like", "between", "ilike"];

fn is_known_operator(op: &str) -> bool {
    let lower = op.to_ascii_lowercase();
    KNOWN_OPERATORS.iter().any(|known| *known == lower)
}

/// A query under construction.
///
/// `Builder` is a single-owner, single-threaded mutable value: fluent calls
/// mutate `ir` in place and return `&mut Self`; a terminal operation
/// compiles and executes, but does not consume or invalidate the builder —
/// further fluent calls may follow, and the terminal may be called again.
pub struct Builder {
    pub ir: BuilderIr,
    connection: Arc<dyn Connection>,
    grammar: Arc<dyn Grammar>,
    processor: Arc<dyn Processor>,
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder").field("ir", &self.ir).finish_non_exhaustive()
    }
}

impl Clone for Builder {
    fn clone(&self) -> Self {
        Builder {
            ir: self.ir.clone(),
            connection: self.connection.clone(),
            grammar: self.grammar.clone(),
            processor: self.processor.clone(),
        }
    }
}

impl PartialEq for Builder {
    /// Compares only the accumulated IR. Two builders sharing the same
    /// collaborators but with identical clause state compare equal; this is
    /// what the sub-builder tests in this crate actually want to assert.
    fn eq(&self, other: &Self) -> bool {
        self.ir == other.ir
    }
}

impl Builder {
    pub fn new(connection: Arc<dyn Connection>, grammar: Arc<dyn Grammar>, processor: Arc<dyn Processor>) -> Self {
        Builder { ir: BuilderIr::default(), connection, grammar, processor }
    }

    /// A fresh builder sharing this one's connection/grammar/processor but
    /// starting with empty IR — the building block every nested/sub-select
    /// path below is made of.
    pub fn new_query(&self) -> Builder {
        Builder {
            ir: BuilderIr::default(),
            connection: self.connection.clone(),
            grammar: self.grammar.clone(),
            processor: self.processor.clone(),
        }
    }

    fn sub_query(&self) -> Builder {
        let mut sub = self.new_query();
        sub.ir.from = self.ir.from.clone();
        sub
    }

    fn push_binding(&mut self, value: impl Into<Bindable>) {
        self.ir.bindings.push(value.into());
    }

    fn merge_bindings_from(&mut self, sub: &Builder) {
        self.ir.bindings.extend(sub.ir.bindings.iter().cloned());
    }

    // ---------------------------------------------------------------
    // Column selection / table / distinct
    // ---------------------------------------------------------------

    pub fn from(&mut self, table: impl Into<String>) -> &mut Self {
        self.ir.from = Some(table.into());
        self
    }

    pub fn select(&mut self, columns: &[&str]) -> &mut Self {
        self.ir.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn add_select(&mut self, columns: &[&str]) -> &mut Self {
        let entry = self.ir.columns.get_or_insert_with(Vec::new);
        entry.extend(columns.iter().map(|c| c.to_string()));
        self
    }

    pub fn distinct(&mut self) -> &mut Self {
        self.ir.distinct = true;
        self
    }

    // ---------------------------------------------------------------
    // where — basic / operator forms
    // ---------------------------------------------------------------

    /// `column = value`.
    pub fn where_eq(&mut self, column: impl Into<String>, value: impl Into<Bindable>) -> &mut Self {
        self.where_value(column.into(), "=".to_string(), value.into(), Conjunction::And)
    }

    pub fn or_where_eq(&mut self, column: impl Into<String>, value: impl Into<Bindable>) -> &mut Self {
        self.where_value(column.into(), "=".to_string(), value.into(), Conjunction::Or)
    }

    /// `column <operator> value`. When `operator` isn't one of the known
    /// comparison operators, it is treated as the *value* and the real
    /// operator becomes `=` — lets a caller write `where_op("name", "Alice",
    /// _)` as shorthand for `where_eq("name", "Alice")`.
    pub fn where_op(&mut self, column: impl Into<String>, operator: impl Into<String>, value: impl Into<Bindable>) -> &mut Self {
        self.where_op_conj(column, operator, value, Conjunction::And)
    }

    pub fn or_where_op(&mut self, column: impl Into<String>, operator: impl Into<String>, value: impl Into<Bindable>) -> &mut Self {
        self.where_op_conj(column, operator, value, Conjunction::Or)
    }

    fn where_op_conj(&mut self, column: impl Into<String>, operator: impl Into<String>, value: impl Into<Bindable>, conjunction: Conjunction) -> &mut Self {
        let column = column.into();
        let operator = operator.into();
        if !is_known_operator(&operator) {
            return self.where_value(column, "=".to_string(), Bindable::from(operator), conjunction);
        }
        self.where_value(column, operator, value.into(), conjunction)
    }

    fn where_value(&mut self, column: String, operator: String, value: Bindable, conjunction: Conjunction) -> &mut Self {
        if let Bindable::Value(Value::Null) = &value {
            let negated = operator != "=";
            return self.where_null_conj(column, negated, conjunction);
        }
        if !value.is_expression() {
            self.push_binding(value.clone());
        }
        self.ir.wheres.push(WherePredicate::Basic { column, operator, value, conjunction });
        self
    }

    /// Compares two columns to each other; neither side binds.
    pub fn where_column(&mut self, first: impl Into<String>, operator: impl Into<String>, second: impl Into<String>) -> &mut Self {
        self.where_column_conj(first, operator, second, Conjunction::And)
    }

    pub fn or_where_column(&mut self, first: impl Into<String>, operator: impl Into<String>, second: impl Into<String>) -> &mut Self {
        self.where_column_conj(first, operator, second, Conjunction::Or)
    }

    fn where_column_conj(&mut self, first: impl Into<String>, operator: impl Into<String>, second: impl Into<String>, conjunction: Conjunction) -> &mut Self {
        self.ir.wheres.push(WherePredicate::Column {
            first: first.into(),
            operator: operator.into(),
            second: second.into(),
            conjunction,
        });
        self
    }

    // ---------------------------------------------------------------
    // where — nested / sub-select / exists
    // ---------------------------------------------------------------

    /// Runs `callback` against a fresh sub-builder and, only if it
    /// accumulated at least one where, appends a parenthesized `Nested`
    /// predicate and merges the sub-builder's bindings upward. An empty
    /// callback produces no clause and no bindings.
    pub fn where_nested(&mut self, callback: impl FnOnce(&mut Builder)) -> &mut Self {
        self.where_nested_conj(callback, Conjunction::And)
    }

    pub fn or_where_nested(&mut self, callback: impl FnOnce(&mut Builder)) -> &mut Self {
        self.where_nested_conj(callback, Conjunction::Or)
    }

    fn where_nested_conj(&mut self, callback: impl FnOnce(&mut Builder), conjunction: Conjunction) -> &mut Self {
        let mut sub = self.sub_query();
        callback(&mut sub);
        if sub.ir.wheres.is_empty() {
            return self;
        }
        self.merge_bindings_from(&sub);
        self.ir.wheres.push(WherePredicate::Nested { query: Box::new(sub), conjunction });
        self
    }

    pub fn where_sub(&mut self, column: impl Into<String>, operator: impl Into<String>, callback: impl FnOnce(&mut Builder)) -> &mut Self {
        self.where_sub_conj(column, operator, callback, Conjunction::And)
    }

    pub fn or_where_sub(&mut self, column: impl Into<String>, operator: impl Into<String>, callback: impl FnOnce(&mut Builder)) -> &mut Self {
        self.where_sub_conj(column, operator, callback, Conjunction::Or)
    }

    fn where_sub_conj(&mut self, column: impl Into<String>, operator: impl Into<String>, callback: impl FnOnce(&mut Builder), conjunction: Conjunction) -> &mut Self {
        let mut sub = self.new_query();
        callback(&mut sub);
        self.merge_bindings_from(&sub);
        self.ir.wheres.push(WherePredicate::Sub { column: column.into(), operator: operator.into(), query: Box::new(sub), conjunction });
        self
    }

    pub fn where_exists(&mut self, callback: impl FnOnce(&mut Builder)) -> &mut Self {
        self.where_exists_conj(callback, false, Conjunction::And)
    }

    pub fn where_not_exists(&mut self, callback: impl FnOnce(&mut Builder)) -> &mut Self {
        self.where_exists_conj(callback, true, Conjunction::And)
    }

    pub fn or_where_exists(&mut self, callback: impl FnOnce(&mut Builder)) -> &mut Self {
        self.where_exists_conj(callback, false, Conjunction::Or)
    }

    pub fn or_where_not_exists(&mut self, callback: impl FnOnce(&mut Builder)) -> &mut Self {
        self.where_exists_conj(callback, true, Conjunction::Or)
    }

    fn where_exists_conj(&mut self, callback: impl FnOnce(&mut Builder), negated: bool, conjunction: Conjunction) -> &mut Self {
        let mut sub = self.new_query();
        callback(&mut sub);
        self.merge_bindings_from(&sub);
        self.ir.wheres.push(WherePredicate::Exists { query: Box::new(sub), negated, conjunction });
        self
    }

    // ---------------------------------------------------------------
    // where — in / not in / in-sub
    // ---------------------------------------------------------------

    pub fn where_in(&mut self, column: impl Into<String>, values: Vec<impl Into<Bindable>>) -> &mut Self {
        self.where_in_conj(column, values, false, Conjunction::And)
    }

    pub fn where_not_in(&mut self, column: impl Into<String>, values: Vec<impl Into<Bindable>>) -> &mut Self {
        self.where_in_conj(column, values, true, Conjunction::And)
    }

    pub fn or_where_in(&mut self, column: impl Into<String>, values: Vec<impl Into<Bindable>>) -> &mut Self {
        self.where_in_conj(column, values, false, Conjunction::Or)
    }

    pub fn or_where_not_in(&mut self, column: impl Into<String>, values: Vec<impl Into<Bindable>>) -> &mut Self {
        self.where_in_conj(column, values, true, Conjunction::Or)
    }

    fn where_in_conj(&mut self, column: impl Into<String>, values: Vec<impl Into<Bindable>>, negated: bool, conjunction: Conjunction) -> &mut Self {
        let count = values.len();
        for value in values {
            self.push_binding(value.into());
        }
        self.ir.wheres.push(WherePredicate::In { column: column.into(), count, negated, conjunction });
        self
    }

    pub fn where_in_sub(&mut self, column: impl Into<String>, callback: impl FnOnce(&mut Builder)) -> &mut Self {
        self.where_in_sub_conj(column, callback, false, Conjunction::And)
    }

    pub fn where_not_in_sub(&mut self, column: impl Into<String>, callback: impl FnOnce(&mut Builder)) -> &mut Self {
        self.where_in_sub_conj(column, callback, true, Conjunction::And)
    }

    pub fn or_where_in_sub(&mut self, column: impl Into<String>, callback: impl FnOnce(&mut Builder)) -> &mut Self {
        self.where_in_sub_conj(column, callback, false, Conjunction::Or)
    }

    fn where_in_sub_conj(&mut self, column: impl Into<String>, callback: impl FnOnce(&mut Builder), negated: bool, conjunction: Conjunction) -> &mut Self {
        let mut sub = self.new_query();
        callback(&mut sub);
        self.merge_bindings_from(&sub);
        self.ir.wheres.push(WherePredicate::InSub { column: column.into(), query: Box::new(sub), negated, conjunction });
        self
    }

    // ---------------------------------------------------------------
    // where — null / between / raw
    // ---------------------------------------------------------------

    pub fn where_null(&mut self, column: impl Into<String>) -> &mut Self {
        self.where_null_conj(column, false, Conjunction::And)
    }

    pub fn where_not_null(&mut self, column: impl Into<String>) -> &mut Self {
        self.where_null_conj(column, true, Conjunction::And)
    }

    pub fn or_where_null(&mut self, column: impl Into<String>) -> &mut Self {
        self.where_null_conj(column, false, Conjunction::Or)
    }

    pub fn or_where_not_null(&mut self, column: impl Into<String>) -> &mut Self {
        self.where_null_conj(column, true, Conjunction::Or)
    }

    fn where_null_conj(&mut self, column: impl Into<String>, negated: bool, conjunction: Conjunction) -> &mut Self {
        self.ir.wheres.push(WherePredicate::Null { column: column.into(), negated, conjunction });
        self
    }

    /// `column [not] between lo and hi`. `bounds` fixes the count to
    /// exactly two at compile time — the two bound values simply live in
    /// `bindings` at the position this predicate is inserted.
    pub fn where_between(&mut self, column: impl Into<String>, bounds: [Bindable; 2]) -> &mut Self {
        self.where_between_conj(column, bounds, false, Conjunction::And)
    }

    pub fn where_not_between(&mut self, column: impl Into<String>, bounds: [Bindable; 2]) -> &mut Self {
        self.where_between_conj(column, bounds, true, Conjunction::And)
    }

    fn where_between_conj(&mut self, column: impl Into<String>, bounds: [Bindable; 2], negated: bool, conjunction: Conjunction) -> &mut Self {
        let [lo, hi] = bounds;
        self.push_binding(lo);
        self.push_binding(hi);
        self.ir.wheres.push(WherePredicate::Between { column: column.into(), negated, conjunction });
        self
    }

    pub fn where_raw(&mut self, sql: impl Into<String>, bindings: Vec<Value>) -> &mut Self {
        self.where_raw_conj(sql, bindings, Conjunction::And)
    }

    pub fn or_where_raw(&mut self, sql: impl Into<String>, bindings: Vec<Value>) -> &mut Self {
        self.where_raw_conj(sql, bindings, Conjunction::Or)
    }

    fn where_raw_conj(&mut self, sql: impl Into<String>, bindings: Vec<Value>, conjunction: Conjunction) -> &mut Self {
        for value in bindings {
            self.ir.bindings.push(Bindable::Value(value));
        }
        self.ir.wheres.push(WherePredicate::Raw { sql: sql.into(), conjunction });
        self
    }

    /// Dynamic-where dispatch: interprets `method_suffix` (the part after
    /// `where`, e.g. `"FirstNameAndLastName"`) as a sequence of
    /// equals-comparisons against `args`, taken positionally.
    pub fn where_dynamic(&mut self, method_suffix: &str, args: &[Bindable]) -> Result<&mut Self> {
        let segments = crate::dynamic::parse_dynamic_where(method_suffix)?;
        if segments.len() != args.len() {
            return Err(QueryBuilderError::InvalidArgument(format!(
                "where{method_suffix} expects {} argument(s), got {}",
                segments.len(),
                args.len()
            )));
        }
        for ((column, conjunction), value) in segments.into_iter().zip(args.iter().cloned()) {
            self.where_value(column, "=".to_string(), value, conjunction);
        }
        Ok(self)
    }

    // ---------------------------------------------------------------
    // joins
    // ---------------------------------------------------------------

    pub fn join(&mut self, table: impl Into<String>, callback: impl FnOnce(&mut JoinClause)) -> &mut Self {
        self.join_kind(JoinType::Inner, table, callback)
    }

    pub fn left_join(&mut self, table: impl Into<String>, callback: impl FnOnce(&mut JoinClause)) -> &mut Self {
        self.join_kind(JoinType::Left, table, callback)
    }

    pub fn right_join(&mut self, table: impl Into<String>, callback: impl FnOnce(&mut JoinClause)) -> &mut Self {
        self.join_kind(JoinType::Right, table, callback)
    }

    pub fn cross_join(&mut self, table: impl Into<String>) -> &mut Self {
        let join = JoinClause::new(JoinType::Cross, table);
        self.ir.joins.push(join);
        self
    }

    fn join_kind(&mut self, kind: JoinType, table: impl Into<String>, callback: impl FnOnce(&mut JoinClause)) -> &mut Self {
        let mut join = JoinClause::new(kind, table);
        callback(&mut join);
        self.ir.bindings.extend(join.bindings.iter().cloned());
        self.ir.joins.push(join);
        self
    }

    // ---------------------------------------------------------------
    // group by / having / order by / limit / offset
    // ---------------------------------------------------------------

    pub fn group_by(&mut self, columns: &[&str]) -> &mut Self {
        self.ir.groups.extend(columns.iter().map(|c| c.to_string()));
        self
    }

    pub fn having(&mut self, column: impl Into<String>, operator: impl Into<String>, value: impl Into<Bindable>) -> &mut Self {
        self.having_conj(column, operator, value, Conjunction::And)
    }

    pub fn or_having(&mut self, column: impl Into<String>, operator: impl Into<String>, value: impl Into<Bindable>) -> &mut Self {
        self.having_conj(column, operator, value, Conjunction::Or)
    }

    fn having_conj(&mut self, column: impl Into<String>, operator: impl Into<String>, value: impl Into<Bindable>, conjunction: Conjunction) -> &mut Self {
        let value = value.into();
        if !value.is_expression() {
            self.push_binding(value.clone());
        }
        self.ir.havings.push(HavingPredicate::Basic { column: column.into(), operator: operator.into(), value, conjunction });
        self
    }

    pub fn having_raw(&mut self, sql: impl Into<String>, bindings: Vec<Value>) -> &mut Self {
        self.having_raw_conj(sql, bindings, Conjunction::And)
    }

    pub fn or_having_raw(&mut self, sql: impl Into<String>, bindings: Vec<Value>) -> &mut Self {
        self.having_raw_conj(sql, bindings, Conjunction::Or)
    }

    fn having_raw_conj(&mut self, sql: impl Into<String>, bindings: Vec<Value>, conjunction: Conjunction) -> &mut Self {
        for value in bindings {
            self.ir.bindings.push(Bindable::Value(value));
        }
        self.ir.havings.push(HavingPredicate::Raw { sql: sql.into(), conjunction });
        self
    }

    pub fn order_by(&mut self, column: impl Into<String>, direction: Direction) -> &mut Self {
        self.ir.orders.push(OrderBy { column: column.into(), direction });
        self
    }

    pub fn order_by_desc(&mut self, column: impl Into<String>) -> &mut Self {
        self.order_by(column, Direction::Desc)
    }

    /// Clears any accumulated ordering — optionally replacing it with a
    /// single new one in the same call.
    pub fn reorder(&mut self, replacement: Option<(String, Direction)>) -> &mut Self {
        self.ir.orders.clear();
        if let Some((column, direction)) = replacement {
            self.ir.orders.push(OrderBy { column, direction });
        }
        self
    }

    pub fn skip(&mut self, n: u64) -> &mut Self {
        self.ir.offset = Some(n);
        self
    }

    /// Only strictly-positive values take effect.
    pub fn take(&mut self, n: i64) -> &mut Self {
        if n > 0 {
            self.ir.limit = Some(n as u64);
        }
        self
    }

    /// `skip((page-1)*per_page).take(per_page)`.
    pub fn for_page(&mut self, page: u64, per_page: u64) -> &mut Self {
        let page = page.max(1);
        self.skip((page - 1) * per_page);
        self.take(per_page as i64);
        self
    }

    // ---------------------------------------------------------------
    // union / when
    // ---------------------------------------------------------------

    pub fn union(&mut self, other: Builder, all: bool) -> &mut Self {
        self.merge_bindings_from(&other);
        self.ir.unions.push(UnionBranch { query: Box::new(other), all });
        self
    }

    pub fn union_nested(&mut self, all: bool, callback: impl FnOnce(&mut Builder)) -> &mut Self {
        let mut sub = self.new_query();
        callback(&mut sub);
        self.union(sub, all)
    }

    /// Conditionally applies `then` (or `else_`) to the builder — pure
    /// host-language control flow with no IR of its own.
    pub fn when(&mut self, condition: bool, then: impl FnOnce(&mut Builder), else_: impl FnOnce(&mut Builder)) -> &mut Self {
        if condition {
            then(self);
        } else {
            else_(self);
        }
        self
    }

    // ---------------------------------------------------------------
    // caching directive
    // ---------------------------------------------------------------

    pub fn remember(&mut self, minutes: u64, key: Option<String>) -> &mut Self {
        self.ir.cache_minutes = Some(minutes);
        self.ir.cache_key = key;
        self
    }

    // ---------------------------------------------------------------
    // terminal operations
    // ---------------------------------------------------------------

    pub fn to_sql(&self) -> Result<(String, Vec<Value>)> {
        let sql = self.grammar.compile_select(&self.ir)?;
        Ok((sql, clean_bindings(self.ir.bindings.clone())))
    }

    pub fn get(&mut self, columns: Option<&[&str]>) -> Result<Vec<Row>> {
        if self.ir.cache_minutes.is_some() {
            return self.get_cached(columns);
        }
        self.get_fresh(columns)
    }

    fn get_fresh(&mut self, columns: Option<&[&str]>) -> Result<Vec<Row>> {
        if self.ir.columns.is_none() {
            if let Some(columns) = columns {
                self.select(columns);
            }
        }
        let (sql, bindings) = self.to_sql()?;
        crate::qb_trace_query!(&sql, bindings.len());
        let rows = self.connection.select(&sql, &bindings).map_err(|e| QueryBuilderError::Connection(e.to_string()))?;
        crate::qb_trace_exec!("select", rows.len());
        Ok(self.processor.process_select(rows))
    }

    fn get_cached(&mut self, columns: Option<&[&str]>) -> Result<Vec<Row>> {
        let (sql, bindings) = self.to_sql()?;
        let key = self.ir.cache_key.clone().unwrap_or_else(|| self.default_cache_key(&sql, &bindings));
        let minutes = self.ir.cache_minutes.unwrap_or(0);
        // Clone the Arc so the cache handle doesn't keep `self` borrowed —
        // the thunk below needs a free `&mut self` to run the real query.
        let connection = self.connection.clone();

        match connection.cache_manager() {
            Some(cache) => {
                let owned_columns: Option<Vec<String>> = columns.map(|c| c.iter().map(|s| s.to_string()).collect());
                cache
                    .remember(
                        &key,
                        minutes,
                        Box::new(move || {
                            let refs: Option<Vec<&str>> = owned_columns.as_ref().map(|v| v.iter().map(|s| s.as_str()).collect());
                            self.get_fresh(refs.as_deref())
                        }),
                    )
                    .map_err(|e| QueryBuilderError::Cache(e.to_string()))
            }
            None => self.get_fresh(columns),
        }
    }

    fn default_cache_key(&self, sql: &str, bindings: &[Value]) -> String {
        use sha2::{Digest, Sha256};
        let serialized = bindings.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("\u{1}");
        let mut hasher = Sha256::new();
        hasher.update(self.connection.name().as_bytes());
        hasher.update(sql.as_bytes());
        hasher.update(serialized.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn first(&mut self, columns: Option<&[&str]>) -> Result<Option<Row>> {
        self.take(1);
        Ok(self.get(columns)?.into_iter().next())
    }

    pub fn find(&mut self, id: impl Into<Bindable>, columns: Option<&[&str]>) -> Result<Option<Row>> {
        self.where_eq("id", id);
        self.first(columns)
    }

    pub fn pluck(&mut self, column: &str) -> Result<Option<Value>> {
        let row = self.first(Some(&[column]))?;
        Ok(row.and_then(|r| row_get(&r, field_name_of(column)).cloned()))
    }

    /// Returns the plain ordered list of `column` values.
    pub fn lists(&mut self, column: &str) -> Result<Vec<Value>> {
        let rows = self.get(Some(&[column]))?;
        let field = field_name_of(column);
        Ok(rows.iter().filter_map(|r| row_get(r, field).cloned()).collect())
    }

    /// Returns `(key_value, column_value)` pairs instead of a plain list.
    pub fn lists_keyed(&mut self, column: &str, key: &str) -> Result<Vec<(Value, Value)>> {
        let rows = self.get(Some(&[column, key]))?;
        let column_field = field_name_of(column);
        let key_field = field_name_of(key);
        Ok(rows
            .iter()
            .filter_map(|r| Some((row_get(r, key_field)?.clone(), row_get(r, column_field)?.clone())))
            .collect())
    }

    fn aggregate_call(&mut self, function: &str, columns: &[&str]) -> Result<Option<Value>> {
        self.ir.aggregate = Some(Aggregate { function: function.to_string(), columns: columns.iter().map(|c| c.to_string()).collect() });
        let result = self.get_fresh(None);
        self.ir.aggregate = None;
        let rows = result?;
        Ok(rows.into_iter().next().and_then(|r| row_get(&r, "aggregate").cloned()))
    }

    pub fn count(&mut self, columns: &[&str]) -> Result<i64> {
        let columns = if columns.is_empty() { vec!["*"] } else { columns.to_vec() };
        match self.aggregate_call("count", &columns)? {
            Some(Value::Integer(n)) => Ok(n),
            _ => Ok(0),
        }
    }

    pub fn min(&mut self, column: &str) -> Result<Option<Value>> {
        self.aggregate_call("min", &[column])
    }

    pub fn max(&mut self, column: &str) -> Result<Option<Value>> {
        self.aggregate_call("max", &[column])
    }

    pub fn sum(&mut self, column: &str) -> Result<Option<Value>> {
        self.aggregate_call("sum", &[column])
    }

    pub fn avg(&mut self, column: &str) -> Result<Option<Value>> {
        self.aggregate_call("avg", &[column])
    }

    pub fn exists(&mut self) -> Result<bool> {
        Ok(self.count(&[])? > 0)
    }

    /// `orders` is saved and restored around the count query, so pagination
    /// never pollutes the caller's ordering.
    fn get_pagination_count(&mut self) -> Result<i64> {
        let saved_orders = std::mem::take(&mut self.ir.orders);
        let count = self.count(&[]);
        self.ir.orders = saved_orders;
        count
    }

    /// The current page comes from the connection's `Paginator` environment
    /// (defaulting to 1 when none is configured), not a caller-supplied
    /// argument.
    pub fn paginate(&mut self, per_page: u64, columns: Option<&[&str]>) -> Result<Pagination> {
        let page = self.connection.paginator().map(|p| p.current_page()).unwrap_or(1).max(1);

        if !self.ir.groups.is_empty() {
            // Grouped: fetch everything and slice in memory rather than
            // attempting a `count(distinct ...)` rewrite.
            let all = self.get(columns)?;
            let total = all.len() as u64;
            let start = ((page - 1) * per_page) as usize;
            let end = (page * per_page) as usize;
            let slice = all.into_iter().skip(start).take(end.saturating_sub(start)).collect::<Vec<_>>();
            return Ok(self.make_pagination(slice, total, per_page, page));
        }

        let total = self.get_pagination_count()? as u64;
        self.for_page(page, per_page);
        let items = self.get(columns)?;
        Ok(self.make_pagination(items, total, per_page, page))
    }

    fn make_pagination(&self, items: Vec<Row>, total: u64, per_page: u64, page: u64) -> Pagination {
        match self.connection.paginator() {
            Some(p) => p.make(items, total, per_page),
            None => Pagination { items, total, per_page, current_page: page },
        }
    }

    pub fn insert(&mut self, records: Vec<Record>) -> Result<bool> {
        if records.is_empty() {
            return Ok(true);
        }
        let mut flat_bindings = Vec::new();
        for record in &records {
            for (_, value) in record {
                flat_bindings.push(value.clone());
            }
        }
        let sql = self.grammar.compile_insert(self.table()?, &records)?;
        let bindings = clean_bindings(flat_bindings);
        crate::qb_trace_query!(&sql, bindings.len());
        let ok = self.connection.insert(&sql, &bindings).map_err(|e| QueryBuilderError::Connection(e.to_string()))?;
        crate::qb_trace_exec!("insert", records.len());
        Ok(ok)
    }

    pub fn insert_get_id(&mut self, record: Record, sequence: Option<&str>) -> Result<i64> {
        let bindings: Vec<Bindable> = record.iter().map(|(_, v)| v.clone()).collect();
        let sql = self.grammar.compile_insert_get_id(self.table()?, &record, sequence)?;
        let clean = clean_bindings(bindings);
        self.processor.process_insert_get_id(self.connection.as_ref(), &sql, &clean, sequence)
    }

    pub fn insert_ignore(&mut self, records: Vec<Record>) -> Result<bool> {
        if records.is_empty() {
            return Ok(true);
        }
        let mut bindings = Vec::new();
        for record in &records {
            for (_, value) in record {
                bindings.push(value.clone());
            }
        }
        let sql = self.grammar.compile_insert_ignore(self.table()?, &records)?;
        let clean = clean_bindings(bindings);
        self.connection.insert(&sql, &clean).map_err(|e| QueryBuilderError::Connection(e.to_string()))
    }

    pub fn insert_ignore_get_id(&mut self, record: Record, sequence: Option<&str>) -> Result<i64> {
        let bindings: Vec<Bindable> = record.iter().map(|(_, v)| v.clone()).collect();
        let sql = self.grammar.compile_insert_ignore_get_id(self.table()?, &record, sequence)?;
        let clean = clean_bindings(bindings);
        self.processor.process_insert_get_id(self.connection.as_ref(), &sql, &clean, sequence)
    }

    /// Computes the update's binding vector locally (`values`' bindings
    /// followed by the existing `where` bindings, since the `set` clause
    /// renders before `where` in the compiled statement) without touching
    /// `self.ir.bindings` — a later `to_sql`/`update`/`delete` on this same
    /// builder must still see only its own where/having bindings.
    pub fn update(&mut self, values: Record) -> Result<u64> {
        let mut call_bindings: Vec<Bindable> = values.iter().map(|(_, v)| v.clone()).collect();
        call_bindings.extend(self.ir.bindings.iter().cloned());

        let sql = self.grammar.compile_update(&self.ir, &values)?;
        let bindings = clean_bindings(call_bindings);
        crate::qb_trace_query!(&sql, bindings.len());
        let affected = self.connection.update(&sql, &bindings).map_err(|e| QueryBuilderError::Connection(e.to_string()))?;
        crate::qb_trace_exec!("update", affected);
        Ok(affected)
    }

    pub fn increment(&mut self, column: &str, amount: i64, extra: Record) -> Result<u64> {
        self.increment_or_decrement(column, amount, extra)
    }

    pub fn decrement(&mut self, column: &str, amount: i64, extra: Record) -> Result<u64> {
        self.increment_or_decrement(column, -amount, extra)
    }

    fn increment_or_decrement(&mut self, column: &str, signed_amount: i64, extra: Record) -> Result<u64> {
        let op = if signed_amount >= 0 { "+" } else { "-" };
        let wrapped = self.grammar.wrap(column);
        let expr = Expression::raw(format!("{} {} {}", wrapped, op, signed_amount.abs()));
        let mut values: Record = vec![(column.to_string(), Bindable::from(expr))];
        values.extend(extra);
        self.update(values)
    }

    pub fn delete(&mut self, id: Option<impl Into<Bindable>>) -> Result<u64> {
        if let Some(id) = id {
            self.where_eq("id", id);
        }
        let sql = self.grammar.compile_delete(&self.ir)?;
        let bindings = clean_bindings(self.ir.bindings.clone());
        crate::qb_trace_query!(&sql, bindings.len());
        let affected = self.connection.delete(&sql, &bindings).map_err(|e| QueryBuilderError::Connection(e.to_string()))?;
        crate::qb_trace_exec!("delete", affected);
        Ok(affected)
    }

    pub fn truncate(&mut self) -> Result<()> {
        for (sql, bindings) in self.grammar.compile_truncate(self.table()?) {
            self.connection.statement(&sql, &bindings).map_err(|e| QueryBuilderError::Connection(e.to_string()))?;
        }
        Ok(())
    }

    fn table(&self) -> Result<&str> {
        self.ir.from.as_deref().ok_or(QueryBuilderError::MissingFromClause)
    }
}

/// `t.c` selectors only use `c` as the row field name.
fn field_name_of(column: &str) -> &str {
    column.rsplit('.').next().unwrap_or(column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::SqliteGrammar;
    use crate::external::{DefaultProcessor, ExternalError};
    use std::sync::Mutex;

    struct MockConnection {
        rows: Mutex<Vec<Row>>,
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
        Builder::new(
            Arc::new(MockConnection { rows: Mutex::new(vec![]) }),
            Arc::new(SqliteGrammar),
            Arc::new(DefaultProcessor),
        )
    }

    #[test]
    fn s1_simple_select() {
        let mut b = builder();
        b.from("users").where_eq("id", 1);
        let (sql, bindings) = b.to_sql().unwrap();
        assert_eq!(sql, "select * from \"users\" where \"id\" = ?");
        assert_eq!(bindings, vec![Value::Integer(1)]);
    }

    #[test]
    fn s2_operator_shortcut() {
        let mut b = builder();
        b.from("users").where_op("name", "Alice", 0);
        let (sql, bindings) = b.to_sql().unwrap();
        assert_eq!(sql, "select * from \"users\" where \"name\" = ?");
        assert_eq!(bindings, vec![Value::Text("Alice".into())]);
    }

    #[test]
    fn s3_nested_or() {
        let mut b = builder();
        b.from("users").where_eq("active", 1).or_where_nested(|q| {
            q.where_op("age", ">", 18).where_eq("verified", 1);
        });
        let (sql, bindings) = b.to_sql().unwrap();
        assert_eq!(sql, "select * from \"users\" where \"active\" = ? or (\"age\" > ? and \"verified\" = ?)");
        assert_eq!(bindings, vec![Value::Integer(1), Value::Integer(18), Value::Integer(1)]);
    }

    #[test]
    fn s4_where_in_with_sub_select() {
        let mut b = builder();
        b.from("a").where_in_sub("id", |q| {
            q.from("b").select(&["a_id"]).where_eq("ok", 1);
        });
        let (sql, bindings) = b.to_sql().unwrap();
        assert_eq!(bindings, vec![Value::Integer(1)]);
        assert!(sql.contains("\"id\" in (select \"a_id\" from \"b\" where \"ok\" = ?)"));
    }

    #[test]
    fn s5_batch_insert_binding_order() {
        let mut b = builder();
        b.from("t");
        let records = vec![
            vec![("a".to_string(), Bindable::from(1)), ("b".to_string(), Bindable::from(2))],
            vec![("a".to_string(), Bindable::from(3)), ("b".to_string(), Bindable::from(4))],
        ];
        b.insert(records).unwrap();
    }

    #[test]
    fn s6_increment() {
        let mut b = builder();
        b.from("t").where_eq("id", 7);
        b.increment("hits", 2, vec![]).unwrap();
        assert_eq!(clean_bindings(b.ir.bindings.clone()), vec![Value::Integer(7)]);
    }

    #[test]
    fn s7_pagination_preserves_orders() {
        let mut b = builder();
        b.from("t").order_by("x", Direction::Asc);
        b.paginate(10, None).unwrap();
        assert_eq!(b.ir.orders, vec![OrderBy { column: "x".to_string(), direction: Direction::Asc }]);
    }

    #[test]
    fn update_does_not_leak_bindings_into_later_compiles() {
        let mut b = builder();
        b.from("t").where_eq("id", 1);
        b.update(vec![("name".to_string(), Bindable::from("Alice"))]).unwrap();
        let (sql, bindings) = b.to_sql().unwrap();
        assert_eq!(sql, "select * from \"t\" where \"id\" = ?");
        assert_eq!(bindings, vec![Value::Integer(1)]);

        // A second update must not compound the first's leftover state either.
        b.update(vec![("name".to_string(), Bindable::from("Bob"))]).unwrap();
        let (_, bindings) = b.to_sql().unwrap();
        assert_eq!(bindings, vec![Value::Integer(1)]);
    }

    #[test]
    fn where_column_compares_columns_without_binding() {
        let mut b = builder();
        b.from("users").where_column("first_name", "=", "last_name");
        let (sql, bindings) = b.to_sql().unwrap();
        assert_eq!(sql, "select * from \"users\" where \"first_name\" = \"last_name\"");
        assert!(bindings.is_empty());
    }

    #[test]
    fn when_applies_then_or_else_branch() {
        let mut on = builder();
        on.from("t").when(true, |q| { q.where_eq("active", 1); }, |_| {});
        assert_eq!(on.ir.wheres.len(), 1);

        let mut off = builder();
        off.from("t").when(false, |q| { q.where_eq("active", 1); }, |q| { q.where_eq("inactive", 1); });
        assert_eq!(off.ir.wheres.len(), 1);
        let (sql, _) = off.to_sql().unwrap();
        assert!(sql.contains("\"inactive\""));
    }

    #[test]
    fn reorder_clears_and_optionally_replaces() {
        let mut b = builder();
        b.from("t").order_by("a", Direction::Asc).order_by("b", Direction::Desc);
        b.reorder(None);
        assert!(b.ir.orders.is_empty());

        b.reorder(Some(("c".to_string(), Direction::Desc)));
        assert_eq!(b.ir.orders, vec![OrderBy { column: "c".to_string(), direction: Direction::Desc }]);
    }

    #[test]
    fn take_ignores_non_positive() {
        let mut b = builder();
        b.from("t").take(0);
        assert_eq!(b.ir.limit, None);
        b.take(5);
        assert_eq!(b.ir.limit, Some(5));
    }

    #[test]
    fn for_page_sets_offset_and_limit() {
        let mut b = builder();
        b.from("t").for_page(3, 10);
        assert_eq!(b.ir.offset, Some(20));
        assert_eq!(b.ir.limit, Some(10));
    }

    #[test]
    fn empty_nested_produces_no_clause() {
        let mut b = builder();
        b.from("t").where_nested(|_| {});
        assert!(b.ir.wheres.is_empty());
        assert!(b.ir.bindings.is_empty());
    }

    #[test]
    fn dynamic_where_matches_manual_chain() {
        let mut dynamic = builder();
        dynamic.from("users").where_dynamic("FirstNameAndLastName", &[Bindable::from("a"), Bindable::from("b")]).unwrap();

        let mut manual = builder();
        manual.from("users").where_eq("first_name", "a").where_eq("last_name", "b");

        assert_eq!(dynamic.to_sql().unwrap(), manual.to_sql().unwrap());
    }

    #[test]
    fn aggregate_clears_after_call() {
        let mut b = builder();
        b.from("t");
        let _ = b.count(&[]);
        assert!(b.ir.aggregate.is_none());
    }
}
