//! The statement execution seam.

use crate::error::OrmResult;
use crate::monitor::QueryType;
use crate::row::Row;
use crate::value::{NO_PARAMS, Params};
use async_trait::async_trait;

/// One statement handed to [`Executor::run_on`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Statement<'a> {
    /// No parameters; yields the affected row count.
    Execute(&'a str),
    Insert(&'a str, &'a Params),
    Select(&'a str, &'a Params),
    Update(&'a str, &'a Params),
    Delete(&'a str, &'a Params),
}

impl<'a> Statement<'a> {
    /// Pick the statement kind from the leading keyword. Row-returning and
    /// unrecognised statements run as selects.
    pub fn classify(sql: &'a str, params: &'a Params) -> Self {
        match QueryType::from_sql(sql) {
            QueryType::Insert => Statement::Insert(sql, params),
            QueryType::Update => Statement::Update(sql, params),
            QueryType::Delete => Statement::Delete(sql, params),
            QueryType::Select | QueryType::Other => Statement::Select(sql, params),
        }
    }

    pub fn sql(&self) -> &'a str {
        match *self {
            Statement::Execute(sql)
            | Statement::Insert(sql, _)
            | Statement::Select(sql, _)
            | Statement::Update(sql, _)
            | Statement::Delete(sql, _) => sql,
        }
    }

    pub fn params(&self) -> &'a Params {
        match *self {
            Statement::Execute(_) => &NO_PARAMS,
            Statement::Insert(_, params)
            | Statement::Select(_, params)
            | Statement::Update(_, params)
            | Statement::Delete(_, params) => params,
        }
    }
}

/// Result of a [`Statement`], shaped by its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Rows(Vec<Row>),
    LastInsertId(u64),
    Affected(u64),
}

impl QueryOutcome {
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            QueryOutcome::Rows(rows) => rows,
            _ => Vec::new(),
        }
    }

    /// The insert id or affected count; the row count for a result set.
    pub fn into_count(self) -> u64 {
        match self {
            QueryOutcome::Rows(rows) => rows.len() as u64,
            QueryOutcome::LastInsertId(n) | QueryOutcome::Affected(n) => n,
        }
    }

    /// Rows touched, for logging.
    pub(crate) fn row_count(&self) -> u64 {
        match self {
            QueryOutcome::Rows(rows) => rows.len() as u64,
            QueryOutcome::LastInsertId(_) => 1,
            QueryOutcome::Affected(n) => *n,
        }
    }
}

/// Run `statement` through the matching `execute_*` method.
pub(crate) async fn dispatch<E: Executor + ?Sized>(
    conn: &E,
    statement: Statement<'_>,
) -> OrmResult<QueryOutcome> {
    Ok(match statement {
        Statement::Execute(sql) => QueryOutcome::Affected(conn.execute(sql).await?),
        Statement::Insert(sql, params) => {
            QueryOutcome::LastInsertId(conn.execute_insert(sql, params).await?)
        }
        Statement::Select(sql, params) => QueryOutcome::Rows(conn.execute_select(sql, params).await?),
        Statement::Update(sql, params) => QueryOutcome::Affected(conn.execute_update(sql, params).await?),
        Statement::Delete(sql, params) => QueryOutcome::Affected(conn.execute_delete(sql, params).await?),
    })
}

/// Runs compiled statements against a database connection.
///
/// Parameters arrive keyed by name (`:id`) or 1-based position; implementors
/// bind them by [`ParamType`](crate::ParamType). Executors are shared across
/// builders and tasks (`Arc<dyn Executor>`), so implementations synchronize
/// internally.
///
/// Builders and adapters go through [`Executor::run_on`], which pairs the
/// default-database switch with the statement. Executors that keep one session
/// for many callers override it (and [`Executor::transaction`]) so nothing
/// else runs on the session in between.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run a statement without parameters; returns the affected row count.
    async fn execute(&self, sql: &str) -> OrmResult<u64>;

    /// Run an INSERT; returns the last insert id.
    async fn execute_insert(&self, sql: &str, params: &Params) -> OrmResult<u64>;

    /// Run a SELECT; returns every row.
    async fn execute_select(&self, sql: &str, params: &Params) -> OrmResult<Vec<Row>>;

    /// Run an UPDATE; returns the affected row count.
    async fn execute_update(&self, sql: &str, params: &Params) -> OrmResult<u64>;

    /// Run a DELETE; returns the affected row count.
    async fn execute_delete(&self, sql: &str, params: &Params) -> OrmResult<u64>;

    /// Switch the default database. Implementations skip the switch when the
    /// connection is already on `name`.
    async fn use_database(&self, name: &str) -> OrmResult<()>;

    async fn begin_transaction(&self) -> OrmResult<()>;

    async fn commit(&self) -> OrmResult<()>;

    async fn rollback(&self) -> OrmResult<()>;

    /// Run `statement` with `database` (when given) as the default database.
    ///
    /// The provided body calls [`Executor::use_database`] and the statement
    /// one after the other.
    async fn run_on(&self, database: Option<&str>, statement: Statement<'_>) -> OrmResult<QueryOutcome> {
        if let Some(db) = database {
            self.use_database(db).await?;
        }
        dispatch(self, statement).await
    }

    /// Begin a transaction and return a handle that runs statements inside
    /// it. End it with `commit` or `rollback` on the handle.
    ///
    /// The provided body sends `BEGIN` and hands back a handle borrowing
    /// `self`; it does not keep other callers off the connection.
    async fn transaction<'a>(&'a self) -> OrmResult<Box<dyn Executor + 'a>> {
        self.begin_transaction().await?;
        Ok(Box::new(Borrowed(self)))
    }
}

struct Borrowed<'a, E: ?Sized>(&'a E);

/// `#[async_trait] impl Executor` forwarding every statement method to
/// `$target`. Extra items (tokens) are appended to the impl.
macro_rules! forward_executor {
    ([$($generics:tt)*] $ty:ty, $this:ident => $target:expr $(, $($extra:tt)*)?) => {
        #[async_trait]
        impl<$($generics)*> Executor for $ty {
            async fn execute(&self, sql: &str) -> OrmResult<u64> {
                let $this = self;
                $target.execute(sql).await
            }

            async fn execute_insert(&self, sql: &str, params: &Params) -> OrmResult<u64> {
                let $this = self;
                $target.execute_insert(sql, params).await
            }

            async fn execute_select(&self, sql: &str, params: &Params) -> OrmResult<Vec<Row>> {
                let $this = self;
                $target.execute_select(sql, params).await
            }

            async fn execute_update(&self, sql: &str, params: &Params) -> OrmResult<u64> {
                let $this = self;
                $target.execute_update(sql, params).await
            }

            async fn execute_delete(&self, sql: &str, params: &Params) -> OrmResult<u64> {
                let $this = self;
                $target.execute_delete(sql, params).await
            }

            async fn use_database(&self, name: &str) -> OrmResult<()> {
                let $this = self;
                $target.use_database(name).await
            }

            async fn begin_transaction(&self) -> OrmResult<()> {
                let $this = self;
                $target.begin_transaction().await
            }

            async fn commit(&self) -> OrmResult<()> {
                let $this = self;
                $target.commit().await
            }

            async fn rollback(&self) -> OrmResult<()> {
                let $this = self;
                $target.rollback().await
            }

            async fn run_on(
                &self,
                database: Option<&str>,
                statement: Statement<'_>,
            ) -> OrmResult<QueryOutcome> {
                let $this = self;
                $target.run_on(database, statement).await
            }

            $($($extra)*)?
        }
    };
}

forward_executor!(['b, E: Executor + ?Sized] Borrowed<'b, E>, this => this.0,
    async fn transaction<'a>(&'a self) -> OrmResult<Box<dyn Executor + 'a>> {
        self.0.transaction().await
    }
);

forward_executor!([T: Executor + ?Sized] std::sync::Arc<T>, this => (**this),
    async fn transaction<'a>(&'a self) -> OrmResult<Box<dyn Executor + 'a>> {
        (**self).transaction().await
    }
);

forward_executor!([T: Executor + ?Sized] Box<T>, this => (**this),
    async fn transaction<'a>(&'a self) -> OrmResult<Box<dyn Executor + 'a>> {
        (**self).transaction().await
    }
);
