//! Shared traversal logic used by every [`super::Grammar`] impl's default
//! `compile_*` methods. Kept as free functions, generic over `G: Grammar +
//! ?Sized`, so dialect structs only need to override identifier quoting and
//! placeholder rendering to get full compilation behavior for free.

use super::Grammar;
use crate::error::{QueryBuilderError, Result};
use crate::ir::{BuilderIr, Conjunction, Direction, HavingPredicate, WherePredicate};
use crate::join::{JoinClause, JoinOperand, JoinType};
use crate::value::Bindable;

fn conjunction_str(c: Conjunction) -> &'static str {
    match c {
        Conjunction::And => "and",
        Conjunction::Or => "or",
    }
}

fn next_placeholder<G: Grammar + ?Sized>(grammar: &G, counter: &mut usize) -> String {
    *counter += 1;
    grammar.placeholder(*counter)
}

/// Renders either a bound placeholder or, for an [`crate::value::Expression`],
/// the raw SQL inline — the one place every compiled statement distinguishes
/// a bindable value from a literal fragment.
fn render_operand<G: Grammar + ?Sized>(grammar: &G, value: &Bindable, counter: &mut usize) -> String {
    match value {
        Bindable::Expression(e) => e.as_str().to_string(),
        Bindable::Value(_) => next_placeholder(grammar, counter),
    }
}

pub(super) fn compile_select<G: Grammar + ?Sized>(grammar: &G, ir: &BuilderIr) -> Result<String> {
    let mut counter = 0usize;
    compile_select_inner(grammar, ir, &mut counter)
}

fn compile_select_inner<G: Grammar + ?Sized>(grammar: &G, ir: &BuilderIr, counter: &mut usize) -> Result<String> {
    let from = ir.from.as_deref().ok_or(QueryBuilderError::MissingFromClause)?;

    let mut sql = String::from("select ");
    if let Some(agg) = &ir.aggregate {
        let cols = agg.columns.iter().map(|c| grammar.wrap(c)).collect::<Vec<_>>().join(", ");
        sql.push_str(&format!("{}({}) as aggregate", agg.function, cols));
    } else {
        if ir.distinct {
            sql.push_str("distinct ");
        }
        let default_cols = vec!["*".to_string()];
        let cols = ir.columns.as_ref().unwrap_or(&default_cols);
        sql.push_str(&cols.iter().map(|c| grammar.wrap(c)).collect::<Vec<_>>().join(", "));
    }

    sql.push_str(" from ");
    sql.push_str(&grammar.wrap(from));

    for join in &ir.joins {
        sql.push_str(&compile_join(grammar, join, counter)?);
    }

    if !ir.wheres.is_empty() {
        sql.push_str(" where ");
        sql.push_str(&compile_wheres(grammar, &ir.wheres, counter)?);
    }

    if !ir.groups.is_empty() {
        sql.push_str(" group by ");
        sql.push_str(&ir.groups.iter().map(|c| grammar.wrap(c)).collect::<Vec<_>>().join(", "));
    }

    if !ir.havings.is_empty() {
        sql.push_str(" having ");
        sql.push_str(&compile_havings(grammar, &ir.havings, counter)?);
    }

    if !ir.orders.is_empty() {
        sql.push_str(" order by ");
        sql.push_str(
            &ir.orders
                .iter()
                .map(|o| format!("{} {}", grammar.wrap(&o.column), match o.direction { Direction::Asc => "asc", Direction::Desc => "desc" }))
                .collect::<Vec<_>>()
                .join(", "),
        );
    }

    if let Some(limit) = ir.limit {
        sql.push_str(&format!(" limit {limit}"));
    }
    if let Some(offset) = ir.offset {
        sql.push_str(&format!(" offset {offset}"));
    }

    for union in &ir.unions {
        sql.push_str(&format!(" union {}", if union.all { "all " } else { "" }));
        sql.push_str(&compile_select_inner(grammar, &union.query.ir, counter)?);
    }

    Ok(sql)
}

fn compile_join<G: Grammar + ?Sized>(grammar: &G, join: &JoinClause, counter: &mut usize) -> Result<String> {
    if join.kind == JoinType::Cross {
        return Ok(format!(" cross join {}", grammar.wrap(&join.table)));
    }

    let keyword = match join.kind {
        JoinType::Inner => "inner join",
        JoinType::Left => "left join",
        JoinType::Right => "right join",
        JoinType::Cross => unreachable!(),
    };

    let mut on_sql = String::new();
    for (i, cond) in join.conditions.iter().enumerate() {
        let rhs = match &cond.second {
            JoinOperand::Column(c) => grammar.wrap(c),
            JoinOperand::Bound(b) => render_operand(grammar, b, counter),
        };
        let frag = format!("{} {} {}", grammar.wrap(&cond.first), cond.operator, rhs);
        if i == 0 {
            on_sql.push_str(&frag);
        } else {
            on_sql.push_str(&format!(" {} {}", conjunction_str(cond.conjunction), frag));
        }
    }

    Ok(format!(" {} {} on {}", keyword, grammar.wrap(&join.table), on_sql))
}

fn compile_wheres<G: Grammar + ?Sized>(grammar: &G, wheres: &[WherePredicate], counter: &mut usize) -> Result<String> {
    let mut out = String::new();
    for (i, predicate) in wheres.iter().enumerate() {
        let frag = compile_where_predicate(grammar, predicate, counter)?;
        if i == 0 {
            out.push_str(&frag);
        } else {
            out.push_str(&format!(" {} {}", conjunction_str(predicate.conjunction()), frag));
        }
    }
    Ok(out)
}

fn compile_where_predicate<G: Grammar + ?Sized>(grammar: &G, predicate: &WherePredicate, counter: &mut usize) -> Result<String> {
    Ok(match predicate {
        WherePredicate::Basic { column, operator, value, .. } => {
            format!("{} {} {}", grammar.wrap(column), operator, render_operand(grammar, value, counter))
        }
        WherePredicate::Column { first, operator, second, .. } => {
            format!("{} {} {}", grammar.wrap(first), operator, grammar.wrap(second))
        }
        WherePredicate::Nested { query, .. } => {
            format!("({})", compile_wheres(grammar, &query.ir.wheres, counter)?)
        }
        WherePredicate::Sub { column, operator, query, .. } => {
            format!("{} {} ({})", grammar.wrap(column), operator, compile_select_inner(grammar, &query.ir, counter)?)
        }
        WherePredicate::Exists { query, negated, .. } => {
            format!("{}exists ({})", if *negated { "not " } else { "" }, compile_select_inner(grammar, &query.ir, counter)?)
        }
        WherePredicate::In { column, count, negated, .. } => {
            let placeholders = (0..*count).map(|_| next_placeholder(grammar, counter)).collect::<Vec<_>>().join(", ");
            format!("{} {}in ({})", grammar.wrap(column), if *negated { "not " } else { "" }, placeholders)
        }
        WherePredicate::InSub { column, query, negated, .. } => {
            format!(
                "{} {}in ({})",
                grammar.wrap(column),
                if *negated { "not " } else { "" },
                compile_select_inner(grammar, &query.ir, counter)?
            )
        }
        WherePredicate::Null { column, negated, .. } => {
            format!("{} is {}null", grammar.wrap(column), if *negated { "not " } else { "" })
        }
        WherePredicate::Between { column, negated, .. } => {
            let lo = next_placeholder(grammar, counter);
            let hi = next_placeholder(grammar, counter);
            format!("{} {}between {} and {}", grammar.wrap(column), if *negated { "not " } else { "" }, lo, hi)
        }
        WherePredicate::Raw { sql, .. } => sql.clone(),
    })
}

fn compile_havings<G: Grammar + ?Sized>(grammar: &G, havings: &[HavingPredicate], counter: &mut usize) -> Result<String> {
    let mut out = String::new();
    for (i, predicate) in havings.iter().enumerate() {
        let frag = match predicate {
            HavingPredicate::Basic { column, operator, value, .. } => {
                format!("{} {} {}", grammar.wrap(column), operator, render_operand(grammar, value, counter))
            }
            HavingPredicate::Raw { sql, .. } => sql.clone(),
        };
        if i == 0 {
            out.push_str(&frag);
        } else {
            out.push_str(&format!(" {} {}", conjunction_str(predicate.conjunction()), frag));
        }
    }
    Ok(out)
}

pub(super) fn compile_insert<G: Grammar + ?Sized>(
    grammar: &G,
    table: &str,
    records: &[Vec<(String, Bindable)>],
    ignore: bool,
) -> Result<String> {
    if records.is_empty() || records[0].is_empty() {
        return Ok(format!("insert into {} default values", grammar.wrap(table)));
    }

    let columns: Vec<&str> = records[0].iter().map(|(c, _)| c.as_str()).collect();
    let col_list = columns.iter().map(|c| grammar.wrap(c)).collect::<Vec<_>>().join(", ");

    let mut counter = 0usize;
    let mut value_groups = Vec::with_capacity(records.len());
    for record in records {
        let placeholders = record.iter().map(|(_, v)| render_operand(grammar, v, &mut counter)).collect::<Vec<_>>().join(", ");
        value_groups.push(format!("({placeholders})"));
    }

    let base = format!("insert into {} ({}) values {}", grammar.wrap(table), col_list, value_groups.join(", "));
    Ok(if ignore { grammar.render_insert_ignore(&base) } else { base })
}

pub(super) fn compile_update<G: Grammar + ?Sized>(grammar: &G, ir: &BuilderIr, values: &[(String, Bindable)]) -> Result<String> {
    let from = ir.from.as_deref().ok_or(QueryBuilderError::MissingFromClause)?;
    let mut counter = 0usize;

    let set_sql = values
        .iter()
        .map(|(col, val)| format!("{} = {}", grammar.wrap(col), render_operand(grammar, val, &mut counter)))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!("update {} set {}", grammar.wrap(from), set_sql);
    if !ir.wheres.is_empty() {
        sql.push_str(" where ");
        sql.push_str(&compile_wheres(grammar, &ir.wheres, &mut counter)?);
    }
    Ok(sql)
}

pub(super) fn compile_delete<G: Grammar + ?Sized>(grammar: &G, ir: &BuilderIr) -> Result<String> {
    let from = ir.from.as_deref().ok_or(QueryBuilderError::MissingFromClause)?;
    let mut counter = 0usize;
    let mut sql = format!("delete from {}", grammar.wrap(from));
    if !ir.wheres.is_empty() {
        sql.push_str(" where ");
        sql.push_str(&compile_wheres(grammar, &ir.wheres, &mut counter)?);
    }
    Ok(sql)
}
