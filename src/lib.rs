//! A fluent, dialect-aware SQL query builder.
//!
//! `Builder` accumulates clause state ([`ir::BuilderIr`]) through a chainable
//! API and compiles it through a [`grammar::Grammar`] into dialect-specific
//! SQL plus an ordered binding vector. Execution is delegated to whatever
//! implements [`external::Connection`] — this crate never opens a socket
//! itself.

pub mod builder;
pub mod dynamic;
pub mod error;
pub mod external;
pub mod grammar;
pub mod ir;
pub mod join;
pub mod trace;
pub mod value;

pub use builder::{Builder, Record};
pub use error::{QueryBuilderError, Result};

/// Brings the common entry points into scope with a single
/// `use querybuilder::prelude::*;`.
pub mod prelude {
    pub use crate::builder::{Builder, Record};
    pub use crate::error::{QueryBuilderError, Result};
    pub use crate::external::{Cache, Connection, DefaultProcessor, ExternalError, Paginator, Pagination, Processor, Row};
    pub use crate::grammar::{Grammar, MySqlGrammar, PostgresGrammar, SqliteGrammar};
    pub use crate::ir::{Conjunction, Direction, OrderBy};
    pub use crate::join::JoinClause;
    pub use crate::value::{Bindable, Expression, Value};
}
