//! Process-wide handle over configured data sources.
//!
//! A [`Registry`] is built once from a [`DatabaseConfig`] and passed to
//! whatever needs database access. It lazily opens one executor per data
//! source (at most one, even under concurrent first use), wraps it in an
//! [`InstrumentedExecutor`], and keeps the table schema cache used by models.

use crate::adapter::DbAdapter;
use crate::config::{DataSourceConfig, DatabaseConfig};
use crate::error::OrmResult;
use crate::executor::Executor;
use crate::model::TableSchema;
use crate::monitor::{InstrumentedExecutor, MonitorConfig, SqlCollection};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

/// Opens executors for configured data sources.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, name: &str, source: &DataSourceConfig) -> OrmResult<Arc<dyn Executor>>;
}

type ExecutorCell = Arc<OnceCell<Arc<dyn Executor>>>;

pub struct Registry {
    config: DatabaseConfig,
    connector: Arc<dyn Connector>,
    executors: Mutex<HashMap<String, ExecutorCell>>,
    schemas: Mutex<HashMap<String, Arc<TableSchema>>>,
    collection: Option<SqlCollection>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("sources", &self.config.sources.keys().collect::<Vec<_>>())
            .field("sql_collection", &self.collection.is_some())
            .finish_non_exhaustive()
    }
}

impl Registry {
    pub fn new(config: DatabaseConfig, connector: impl Connector + 'static) -> Self {
        Self::with_connector_arc(config, Arc::new(connector))
    }

    pub fn with_connector_arc(config: DatabaseConfig, connector: Arc<dyn Connector>) -> Self {
        let collection = config.sql_collection.then(SqlCollection::new);
        Self {
            config,
            connector,
            executors: Mutex::new(HashMap::new()),
            schemas: Mutex::new(HashMap::new()),
            collection,
        }
    }

    /// Registry backed by the sqlx MySQL connector.
    #[cfg(feature = "mysql")]
    pub fn mysql(config: DatabaseConfig) -> Self {
        Self::new(config, crate::mysql::MySqlConnector)
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Readable SQL of every executed statement, when `sql_collection` is on.
    pub fn sql_collection(&self) -> Option<&SqlCollection> {
        self.collection.as_ref()
    }

    /// Executor for `source` (or the default source), connecting on first use.
    ///
    /// Every caller of the same source shares one executor. Builders pair the
    /// database switch with each statement, so concurrent builders on
    /// different databases stay apart. For a transaction use
    /// [`Executor::transaction`] (or [`transaction!`](crate::transaction)) and
    /// send statements through the returned handle; `begin_transaction` alone
    /// does not keep other callers out.
    pub async fn executor(&self, source: Option<&str>) -> OrmResult<Arc<dyn Executor>> {
        let (name, source_config) = self.config.source(source)?;
        let cell = {
            let mut executors = self
                .executors
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            executors.entry(name.to_string()).or_default().clone()
        };
        let executor = cell
            .get_or_try_init(|| async {
                tracing::debug!(target: "myorm.registry", source = name, "opening connection");
                let raw = self.connector.connect(name, source_config).await?;
                Ok::<_, crate::OrmError>(self.instrument(raw))
            })
            .await?;
        Ok(executor.clone())
    }

    fn instrument(&self, raw: Arc<dyn Executor>) -> Arc<dyn Executor> {
        let mut monitor = MonitorConfig::new();
        if let Some(threshold) = self.config.slow_query_threshold() {
            monitor = monitor.with_slow_query_threshold(threshold);
        }
        let mut instrumented = InstrumentedExecutor::new(raw).with_config(monitor);
        if let Some(collection) = &self.collection {
            instrumented = instrumented.with_collection(collection.clone());
        }
        Arc::new(instrumented)
    }

    /// Adapter bound to a source, database and table.
    pub async fn adapter(
        &self,
        source: Option<&str>,
        database: Option<&str>,
        table: &str,
    ) -> OrmResult<DbAdapter> {
        let conn = self.executor(source).await?;
        let mut adapter = DbAdapter::new(conn, database, table);
        if let Some(collection) = &self.collection {
            adapter = adapter.with_collection(collection.clone());
        }
        Ok(adapter)
    }

    pub fn cached_schema(&self, key: &str) -> Option<Arc<TableSchema>> {
        self.schemas
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    pub fn cache_schema(&self, key: impl Into<String>, schema: Arc<TableSchema>) {
        self.schemas
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.into(), schema);
    }

    pub fn forget_schema(&self, key: &str) {
        self.schemas
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(key);
    }
}
