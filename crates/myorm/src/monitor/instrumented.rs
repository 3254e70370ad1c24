use super::{MonitorConfig, QueryType, SqlCollection};
use crate::error::OrmResult;
use crate::executor::{Executor, QueryOutcome, Statement};
use crate::placeholder;
use crate::row::Row;
use crate::value::Params;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::Level;

/// An executor wrapper that logs every statement through `tracing`.
pub struct InstrumentedExecutor<E> {
    inner: E,
    config: MonitorConfig,
    collection: Option<SqlCollection>,
}

impl<E: Executor> InstrumentedExecutor<E> {
    /// Wrap an executor with default configuration.
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            config: MonitorConfig::default(),
            collection: None,
        }
    }

    pub fn with_config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    /// Record every readable statement into `collection`.
    pub fn with_collection(mut self, collection: SqlCollection) -> Self {
        self.collection = Some(collection);
        self
    }

    pub fn collection(&self) -> Option<&SqlCollection> {
        self.collection.as_ref()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Get a reference to the inner executor.
    pub fn inner(&self) -> &E {
        &self.inner
    }

    /// Get the inner executor, consuming this wrapper.
    pub fn into_inner(self) -> E {
        self.inner
    }

    fn observe<T>(
        &self,
        sql: &str,
        params: &Params,
        elapsed: Duration,
        result: &OrmResult<T>,
        rows: impl Fn(&T) -> u64,
    ) {
        let readable = if params.is_empty() {
            sql.to_string()
        } else {
            placeholder::interpolate(sql, params)
        };
        let shown = self.config.truncate_sql(&readable);
        if let Some(collection) = &self.collection {
            collection.push(readable);
        }

        let query_type = QueryType::from_sql(sql);
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let slow = self
            .config
            .slow_query_threshold
            .is_some_and(|threshold| elapsed >= threshold);

        /// Dispatch a tracing event at a runtime-determined level.
        macro_rules! emit_at_level {
            ($level:expr, $($field:tt)*) => {
                match $level {
                    Level::ERROR => tracing::error!($($field)*),
                    Level::WARN  => tracing::warn!($($field)*),
                    Level::INFO  => tracing::info!($($field)*),
                    Level::DEBUG => tracing::debug!($($field)*),
                    Level::TRACE => tracing::trace!($($field)*),
                }
            };
        }

        match result {
            Ok(value) => {
                let level = if slow { Level::WARN } else { self.config.level };
                emit_at_level!(
                    level,
                    target: "myorm.sql",
                    query_type = ?query_type,
                    param_count = params.len(),
                    elapsed_ms,
                    rows = rows(value),
                    slow,
                    sql = %shown,
                );
            }
            Err(error) => {
                tracing::warn!(
                    target: "myorm.sql",
                    query_type = ?query_type,
                    param_count = params.len(),
                    elapsed_ms,
                    error = %error,
                    sql = %shown,
                );
            }
        }
    }
}

#[async_trait]
impl<E: Executor> Executor for InstrumentedExecutor<E> {
    async fn execute(&self, sql: &str) -> OrmResult<u64> {
        let start = Instant::now();
        let result = self.inner.execute(sql).await;
        self.observe(sql, &Params::new(), start.elapsed(), &result, |n| *n);
        result
    }

    async fn execute_insert(&self, sql: &str, params: &Params) -> OrmResult<u64> {
        let start = Instant::now();
        let result = self.inner.execute_insert(sql, params).await;
        self.observe(sql, params, start.elapsed(), &result, |_| 1);
        result
    }

    async fn execute_select(&self, sql: &str, params: &Params) -> OrmResult<Vec<Row>> {
        let start = Instant::now();
        let result = self.inner.execute_select(sql, params).await;
        self.observe(sql, params, start.elapsed(), &result, |rows| rows.len() as u64);
        result
    }

    async fn execute_update(&self, sql: &str, params: &Params) -> OrmResult<u64> {
        let start = Instant::now();
        let result = self.inner.execute_update(sql, params).await;
        self.observe(sql, params, start.elapsed(), &result, |n| *n);
        result
    }

    async fn execute_delete(&self, sql: &str, params: &Params) -> OrmResult<u64> {
        let start = Instant::now();
        let result = self.inner.execute_delete(sql, params).await;
        self.observe(sql, params, start.elapsed(), &result, |n| *n);
        result
    }

    async fn use_database(&self, name: &str) -> OrmResult<()> {
        self.inner.use_database(name).await
    }

    async fn begin_transaction(&self) -> OrmResult<()> {
        let start = Instant::now();
        let result = self.inner.begin_transaction().await;
        self.observe("START TRANSACTION", &Params::new(), start.elapsed(), &result, |_| 0);
        result
    }

    async fn commit(&self) -> OrmResult<()> {
        let start = Instant::now();
        let result = self.inner.commit().await;
        self.observe("COMMIT", &Params::new(), start.elapsed(), &result, |_| 0);
        result
    }

    async fn rollback(&self) -> OrmResult<()> {
        let start = Instant::now();
        let result = self.inner.rollback().await;
        self.observe("ROLLBACK", &Params::new(), start.elapsed(), &result, |_| 0);
        result
    }

    async fn run_on(&self, database: Option<&str>, statement: Statement<'_>) -> OrmResult<QueryOutcome> {
        let start = Instant::now();
        let result = self.inner.run_on(database, statement).await;
        self.observe(
            statement.sql(),
            statement.params(),
            start.elapsed(),
            &result,
            QueryOutcome::row_count,
        );
        result
    }

    /// The handle is instrumented with the same configuration and collection.
    async fn transaction<'a>(&'a self) -> OrmResult<Box<dyn Executor + 'a>> {
        let start = Instant::now();
        let result = self.inner.transaction().await;
        self.observe("START TRANSACTION", &Params::new(), start.elapsed(), &result, |_| 0);
        Ok(Box::new(InstrumentedExecutor {
            inner: result?,
            config: self.config.clone(),
            collection: self.collection.clone(),
        }))
    }
}
