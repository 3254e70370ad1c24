//! JSON-aware SQL builder.
//!
//! [`Expr`] values are immutable SQL fragments, [`Where`] accepts every
//! supported where shape and [`normalize`] turns it into a fragment plus
//! parameters. [`SqlBuilder`] accumulates clause state and compiles one
//! statement per [`Action`].
//!
//! ```
//! use myorm::{Action, Arg, SqlBuilder, Value, Where};
//!
//! let mut qb = SqlBuilder::new();
//! qb.table("user")
//!     .data("json_column", Arg::paths([("a", 100)]))
//!     .filter(Where::and([("id", 5)]));
//! let built = qb.build_sql(Action::Update)?;
//! assert!(built
//!     .sql
//!     .contains("`json_column` = JSON_SET(`json_column`, '$.a', :upd_json_column_a)"));
//! assert_eq!(built.params.get(":upd_json_column_a"), Some(&Value::Int(100)));
//! # Ok::<(), myorm::OrmError>(())
//! ```

mod arg;
mod builder;
mod condition;
mod expr;

pub use arg::Arg;
pub use builder::{Action, Built, Direction, Field, JoinType, SqlBuilder, UnionWith};
pub use condition::{Condition, Join, Where, normalize};
pub use expr::{Expr, Part};

pub(crate) use condition::bind_name;

#[cfg(test)]
mod tests;
