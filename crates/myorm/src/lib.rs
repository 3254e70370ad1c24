//! # myorm
//!
//! A MySQL active-record layer with a JSON-aware SQL builder.
//!
//! ## Features
//!
//! - **Builder first**: [`SqlBuilder`] compiles SELECT/INSERT/UPDATE/DELETE and
//!   UNION statements with named parameters
//! - **JSON columns**: path maps become `JSON_SET` patches in updates and
//!   `col->'$.path'` comparisons in where lists
//! - **Records**: [`Model`] for one row over a discovered schema, [`Manager`]
//!   for condition-based access, [`FromRow`] for typed records
//! - **Explicit wiring**: a [`Registry`] built from [`DatabaseConfig`] owns one
//!   executor per data source
//! - **Query monitoring**: every executed statement is traced under the
//!   `myorm.sql` target and optionally collected as readable SQL
//!
//! ## Query Builder (qb)
//!
//! ```ignore
//! use myorm::{Direction, Registry, DatabaseConfig, SqlBuilder, Where};
//!
//! let registry = Registry::mysql(DatabaseConfig::load("database.toml")?);
//! let conn = registry.executor(None).await?;
//!
//! let mut qb = SqlBuilder::new();
//! let rows = qb
//!     .table("user")
//!     .filter(Where::and([("status", "active")]))
//!     .order("created_at", Direction::Desc)
//!     .length(10)
//!     .select(&*conn)
//!     .await?;
//! ```

pub mod adapter;
pub mod config;
pub mod error;
pub mod executor;
pub mod ident;
pub mod model;
pub mod monitor;
pub mod qb;
pub mod registry;
pub mod row;
pub mod transaction;
pub mod value;

mod placeholder;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(test)]
mod test_util;

pub use adapter::DbAdapter;
pub use config::{DataSourceConfig, DatabaseConfig};
pub use error::{OrmError, OrmResult};
pub use executor::{Executor, QueryOutcome, Statement};
pub use ident::{Ident, json_path, quote_target};
pub use model::{
    ColumnType, JsonColumn, Manager, Model, ModelOptions, SaveOutcome, TableRef, TableSchema,
};
pub use monitor::{InstrumentedExecutor, MonitorConfig, QueryType, SqlCollection};
pub use qb::{
    Action, Arg, Built, Condition, Direction, Expr, Field, Join, JoinType, Part, SqlBuilder,
    Where, normalize,
};
pub use registry::{Connector, Registry};
pub use row::{FromRow, FromValue, Row};
pub use value::{ParamType, Params, Value};
