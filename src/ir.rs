//! The clause intermediate representation: every field a [`crate::builder::Builder`]
//! accumulates while a query is under construction, plus the tagged variants
//! that make up `wheres` and `havings`.

use crate::join::JoinClause;
use crate::value::Bindable;

/// The conjunction joining a predicate to the one before it in sequence.
/// The first predicate's tag is always ignored by the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conjunction {
    And,
    Or,
}

/// Sort direction for an `ORDER BY` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// One `ORDER BY` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

/// One entry of the `wheres` sequence: a tagged variant over every
/// expressible predicate shape. The `conjunction` field on every variant
/// denotes how this predicate joins to the *preceding* entry.
#[derive(Debug, Clone, PartialEq)]
pub enum WherePredicate {
    /// `column operator value`. `value` is `None` when the predicate's value
    /// was an [`crate::value::Expression`] and therefore lives inline in the
    /// rendered column/value text rather than in bindings — see
    /// `Builder::where_` for how the Basic/column-compare split is decided.
    Basic {
        column: String,
        operator: String,
        value: Bindable,
        conjunction: Conjunction,
    },
    /// Two columns compared to each other; neither side binds.
    Column {
        first: String,
        operator: String,
        second: String,
        conjunction: Conjunction,
    },
    /// `(...)` — a parenthesized group of the sub-builder's own wheres.
    Nested { query: Box<crate::builder::Builder>, conjunction: Conjunction },
    /// `column operator (sub-select)`.
    Sub {
        column: String,
        operator: String,
        query: Box<crate::builder::Builder>,
        conjunction: Conjunction,
    },
    /// `[not] exists (sub-select)`.
    Exists {
        query: Box<crate::builder::Builder>,
        negated: bool,
        conjunction: Conjunction,
    },
    /// `column [not] in (v1, v2, ...)`. Values live in bindings, in order;
    /// `count` records how many placeholders to render since the list
    /// length is variable (unlike `Between`, which is always exactly two).
    In {
        column: String,
        count: usize,
        negated: bool,
        conjunction: Conjunction,
    },
    /// `column [not] in (sub-select)`.
    InSub {
        column: String,
        query: Box<crate::builder::Builder>,
        negated: bool,
        conjunction: Conjunction,
    },
    /// `column is [not] null`.
    Null { column: String, negated: bool, conjunction: Conjunction },
    /// `column [not] between ? and ?`. No `values` field: the two bound
    /// values live in `bindings` at the position this predicate was
    /// inserted, and the grammar must infer them from binding position
    /// alone rather than from this variant.
    Between { column: String, negated: bool, conjunction: Conjunction },
    /// A verbatim SQL fragment, inserted as-is in the predicate position.
    Raw { sql: String, conjunction: Conjunction },
}

impl WherePredicate {
    pub fn conjunction(&self) -> Conjunction {
        match self {
            WherePredicate::Basic { conjunction, .. }
            | WherePredicate::Column { conjunction, .. }
            | WherePredicate::Nested { conjunction, .. }
            | WherePredicate::Sub { conjunction, .. }
            | WherePredicate::Exists { conjunction, .. }
            | WherePredicate::In { conjunction, .. }
            | WherePredicate::InSub { conjunction, .. }
            | WherePredicate::Null { conjunction, .. }
            | WherePredicate::Between { conjunction, .. }
            | WherePredicate::Raw { conjunction, .. } => *conjunction,
        }
    }
}

/// One entry of the `havings` sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum HavingPredicate {
    Basic {
        column: String,
        operator: String,
        value: Bindable,
        conjunction: Conjunction,
    },
    Raw { sql: String, conjunction: Conjunction },
}

impl HavingPredicate {
    pub fn conjunction(&self) -> Conjunction {
        match self {
            HavingPredicate::Basic { conjunction, .. } => *conjunction,
            HavingPredicate::Raw { conjunction, .. } => *conjunction,
        }
    }
}

/// A pending aggregate call: set by `count`/`min`/`max`/`sum`/`avg`,
/// consumed by the next compile, then cleared. Mutually exclusive with
/// ordinary column selection at compile time.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub function: String,
    pub columns: Vec<String>,
}

/// One `UNION` branch: the sub-builder and whether it's a `UNION ALL`.
#[derive(Debug, Clone, PartialEq)]
pub struct UnionBranch {
    pub query: Box<crate::builder::Builder>,
    pub all: bool,
}

/// The full clause IR owned by one [`crate::builder::Builder`] instance.
///
/// Binding order is load-bearing: each time a clause contributes a bindable
/// value, it is appended to `bindings` at the moment of clause insertion, and
/// a grammar emits placeholders in the fixed traversal order `select → from →
/// joins → wheres → groups → havings → orders → unions` to match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuilderIr {
    pub from: Option<String>,
    pub columns: Option<Vec<String>>,
    pub distinct: bool,
    pub joins: Vec<JoinClause>,
    pub wheres: Vec<WherePredicate>,
    pub groups: Vec<String>,
    pub havings: Vec<HavingPredicate>,
    pub orders: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub unions: Vec<UnionBranch>,
    pub aggregate: Option<Aggregate>,
    pub bindings: Vec<Bindable>,
    pub cache_key: Option<String>,
    pub cache_minutes: Option<u64>,
}
