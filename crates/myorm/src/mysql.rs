//! sqlx-backed MySQL executor.
//!
//! One connection per data source, guarded by an async mutex. Named
//! placeholders are rewritten to `?` and values bound in order of appearance,
//! tagged by [`ParamType`]. Session statements (`USE`, `SET`, transaction
//! control) go over the text protocol.
//!
//! [`Executor::run_on`] switches the database and runs the statement under one
//! lock. [`Executor::transaction`] returns a [`MySqlTransaction`] that holds the
//! lock until it commits or rolls back; other callers wait for it.

use crate::config::{ConnectionSettings, DataSourceConfig, SslMode};
use crate::error::{OrmError, OrmResult};
use crate::executor::{Executor, QueryOutcome, Statement};
use crate::ident::Ident;
use crate::placeholder;
use crate::registry::Connector;
use crate::row::Row;
use crate::value::{ParamType, Params, Value};
use async_trait::async_trait;
use sqlx::mysql::{
    MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlQueryResult, MySqlRow, MySqlSslMode,
};
use sqlx::query::Query;
use sqlx::{Column as _, Connection as _, Executor as _, MySql, Row as _, TypeInfo as _, ValueRef as _};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

struct Session {
    conn: MySqlConnection,
    database: Option<String>,
    /// A [`MySqlTransaction`] began and has not finished yet.
    held_transaction: bool,
}

impl Session {
    async fn switch(&mut self, name: &str) -> OrmResult<()> {
        if self.database.as_deref() == Some(name) {
            return Ok(());
        }
        let sql = format!("USE {}", Ident::quoted(name)?.to_sql());
        self.text(&sql).await?;
        self.database = Some(name.to_string());
        Ok(())
    }

    async fn text(&mut self, sql: &str) -> OrmResult<u64> {
        let result = (&mut self.conn)
            .execute(sql)
            .await
            .map_err(OrmError::from_db_error)?;
        Ok(result.rows_affected())
    }

    async fn bound(&mut self, sql: &str, params: &Params) -> OrmResult<MySqlQueryResult> {
        let (sql, values) = placeholder::to_positional(sql, params)?;
        bind_all(sqlx::query(&sql), values)
            .execute(&mut self.conn)
            .await
            .map_err(OrmError::from_db_error)
    }

    async fn run(&mut self, statement: Statement<'_>) -> OrmResult<QueryOutcome> {
        Ok(match statement {
            Statement::Execute(sql) => QueryOutcome::Affected(self.text(sql).await?),
            Statement::Select(sql, params) => {
                let (sql, values) = placeholder::to_positional(sql, params)?;
                let rows = bind_all(sqlx::query(&sql), values)
                    .fetch_all(&mut self.conn)
                    .await
                    .map_err(OrmError::from_db_error)?;
                QueryOutcome::Rows(rows.iter().map(decode_row).collect::<OrmResult<_>>()?)
            }
            Statement::Insert(sql, params) => {
                QueryOutcome::LastInsertId(self.bound(sql, params).await?.last_insert_id())
            }
            Statement::Update(sql, params) | Statement::Delete(sql, params) => {
                QueryOutcome::Affected(self.bound(sql, params).await?.rows_affected())
            }
        })
    }

    async fn run_on(&mut self, database: Option<&str>, statement: Statement<'_>) -> OrmResult<QueryOutcome> {
        if let Some(db) = database {
            self.switch(db).await?;
        }
        self.run(statement).await
    }

    async fn finish(&mut self, sql: &str) -> OrmResult<()> {
        self.held_transaction = false;
        self.text(sql).await.map(|_| ())
    }
}

/// A single MySQL connection implementing [`Executor`].
pub struct MySqlExecutor {
    session: Mutex<Session>,
}

impl std::fmt::Debug for MySqlExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlExecutor").finish_non_exhaustive()
    }
}

impl MySqlExecutor {
    /// Connect and set the session time zone to the local UTC offset.
    pub async fn connect(options: &MySqlConnectOptions, database: Option<String>) -> OrmResult<Self> {
        let mut conn = MySqlConnection::connect_with(options)
            .await
            .map_err(|e| OrmError::configuration(format!("Failed to connect to MySQL: {e}")))?;
        let offset = chrono::Local::now().format("%:z").to_string();
        (&mut conn)
            .execute(format!("SET time_zone = '{offset}'").as_str())
            .await
            .map_err(OrmError::from_db_error)?;
        Ok(Self {
            session: Mutex::new(Session {
                conn,
                database,
                held_transaction: false,
            }),
        })
    }

    /// Connect with settings resolved from a data source definition.
    pub async fn from_settings(settings: &ConnectionSettings) -> OrmResult<Self> {
        Self::connect(&connect_options(settings), settings.dbname.clone()).await
    }

    /// Connect to a `mysql://` URL.
    pub async fn from_url(url: &str) -> OrmResult<Self> {
        let options: MySqlConnectOptions = url
            .parse()
            .map_err(|e| OrmError::configuration(format!("Invalid database URL: {e}")))?;
        let database = url::Url::parse(url)
            .ok()
            .map(|u| u.path().trim_start_matches('/').to_string())
            .filter(|db| !db.is_empty());
        Self::connect(&options, database).await
    }

    /// Lock the session. A transaction handle dropped without commit or
    /// rollback is rolled back first.
    async fn lock(&self) -> OrmResult<MutexGuard<'_, Session>> {
        let mut session = self.session.lock().await;
        if session.held_transaction {
            tracing::warn!(target: "myorm.sql", "transaction handle dropped unfinished; rolling back");
            session.finish("ROLLBACK").await?;
        }
        Ok(session)
    }
}

/// A transaction holding the [`MySqlExecutor`] session until `commit` or
/// `rollback`.
pub struct MySqlTransaction<'a> {
    session: Mutex<MutexGuard<'a, Session>>,
}

impl std::fmt::Debug for MySqlTransaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlTransaction").finish_non_exhaustive()
    }
}

/// Connection options for resolved settings.
pub fn connect_options(settings: &ConnectionSettings) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .host(&settings.host)
        .port(settings.port);
    if let Some(user) = &settings.user {
        options = options.username(user);
    }
    if let Some(password) = &settings.password {
        options = options.password(password);
    }
    if let Some(dbname) = &settings.dbname {
        options = options.database(dbname);
    }
    if let Some(charset) = &settings.charset {
        options = options.charset(charset);
    }
    if let Some(socket) = &settings.unix_socket {
        options = options.socket(socket);
    }
    if let Some(ssl) = &settings.ssl {
        options = options.ssl_mode(match ssl.mode {
            SslMode::Disabled => MySqlSslMode::Disabled,
            SslMode::Preferred => MySqlSslMode::Preferred,
            SslMode::Required => MySqlSslMode::Required,
            SslMode::VerifyCa => MySqlSslMode::VerifyCa,
            SslMode::VerifyIdentity => MySqlSslMode::VerifyIdentity,
        });
        if let Some(ca) = &ssl.ca {
            options = options.ssl_ca(ca);
        }
        if let Some(cert) = &ssl.cert {
            options = options.ssl_client_cert(cert);
        }
        if let Some(key) = &ssl.key {
            options = options.ssl_client_key(key);
        }
    }
    options
}

fn bind_all<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    values: Vec<Value>,
) -> Query<'q, MySql, MySqlArguments> {
    for value in values {
        query = match (value.param_type(), value) {
            (ParamType::Null, _) => query.bind(Option::<String>::None),
            (ParamType::Bool, Value::Bool(b)) => query.bind(b),
            (ParamType::Int, Value::Int(i)) => query.bind(i),
            (_, Value::Str(s)) => query.bind(s),
            (_, other) => query.bind(other.to_string()),
        };
    }
    query
}

fn decode_row(row: &MySqlRow) -> OrmResult<Row> {
    let mut out = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        out.push(column.name(), decode_value(row, index)?);
    }
    Ok(out)
}

fn decode_value(row: &MySqlRow, index: usize) -> OrmResult<Value> {
    let column = &row.columns()[index];
    let fail = |e: sqlx::Error| OrmError::decode(column.name(), e.to_string());

    if row.try_get_raw(index).map_err(fail)?.is_null() {
        return Ok(Value::Null);
    }

    let type_name = column.type_info().name();
    let value = match type_name {
        "BOOLEAN" => Value::Bool(row.try_get(index).map_err(fail)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            Value::Int(row.try_get_unchecked::<i64, _>(index).map_err(fail)?)
        }
        name if name.ends_with("UNSIGNED") || name == "YEAR" || name == "BIT" => {
            Value::from(row.try_get_unchecked::<u64, _>(index).map_err(fail)?)
        }
        "FLOAT" => Value::Float(f64::from(row.try_get::<f32, _>(index).map_err(fail)?)),
        "DOUBLE" => Value::Float(row.try_get(index).map_err(fail)?),
        "DATETIME" | "TIMESTAMP" => {
            let value: chrono::NaiveDateTime = row.try_get(index).map_err(fail)?;
            Value::Str(value.format("%Y-%m-%d %H:%M:%S%.f").to_string())
        }
        "DATE" => {
            let value: chrono::NaiveDate = row.try_get(index).map_err(fail)?;
            Value::Str(value.format("%Y-%m-%d").to_string())
        }
        "TIME" => {
            let value: chrono::NaiveTime = row.try_get(index).map_err(fail)?;
            Value::Str(value.format("%H:%M:%S%.f").to_string())
        }
        "JSON" => {
            let value: serde_json::Value = row.try_get(index).map_err(fail)?;
            Value::Str(value.to_string())
        }
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            let bytes: Vec<u8> = row.try_get_unchecked(index).map_err(fail)?;
            Value::Str(String::from_utf8_lossy(&bytes).into_owned())
        }
        // DECIMAL, ENUM, SET and text types arrive as text
        _ => Value::Str(row.try_get_unchecked::<String, _>(index).map_err(fail)?),
    };
    Ok(value)
}

/// `#[async_trait] impl Executor` over a session reached through `$lock`.
macro_rules! session_executor {
    ([$($generics:tt)*] $ty:ty, $this:ident => $lock:expr $(, $($extra:tt)*)?) => {
        #[async_trait]
        impl<$($generics)*> Executor for $ty {
            async fn execute(&self, sql: &str) -> OrmResult<u64> {
                Ok(self.run_on(None, Statement::Execute(sql)).await?.into_count())
            }

            async fn execute_insert(&self, sql: &str, params: &Params) -> OrmResult<u64> {
                Ok(self.run_on(None, Statement::Insert(sql, params)).await?.into_count())
            }

            async fn execute_select(&self, sql: &str, params: &Params) -> OrmResult<Vec<Row>> {
                Ok(self.run_on(None, Statement::Select(sql, params)).await?.into_rows())
            }

            async fn execute_update(&self, sql: &str, params: &Params) -> OrmResult<u64> {
                Ok(self.run_on(None, Statement::Update(sql, params)).await?.into_count())
            }

            async fn execute_delete(&self, sql: &str, params: &Params) -> OrmResult<u64> {
                Ok(self.run_on(None, Statement::Delete(sql, params)).await?.into_count())
            }

            async fn use_database(&self, name: &str) -> OrmResult<()> {
                let $this = self;
                let mut session = $lock;
                session.switch(name).await
            }

            async fn begin_transaction(&self) -> OrmResult<()> {
                let $this = self;
                let mut session = $lock;
                session.text("BEGIN").await.map(|_| ())
            }

            async fn commit(&self) -> OrmResult<()> {
                let $this = self;
                let mut session = $lock;
                session.finish("COMMIT").await
            }

            async fn rollback(&self) -> OrmResult<()> {
                let $this = self;
                let mut session = $lock;
                session.finish("ROLLBACK").await
            }

            async fn run_on(
                &self,
                database: Option<&str>,
                statement: Statement<'_>,
            ) -> OrmResult<QueryOutcome> {
                let $this = self;
                let mut session = $lock;
                session.run_on(database, statement).await
            }

            $($($extra)*)?
        }
    };
}

session_executor!([] MySqlExecutor, this => this.lock().await?,
    async fn transaction<'a>(&'a self) -> OrmResult<Box<dyn Executor + 'a>> {
        let mut session = self.lock().await?;
        session.text("BEGIN").await?;
        session.held_transaction = true;
        Ok(Box::new(MySqlTransaction {
            session: Mutex::new(session),
        }))
    }
);

session_executor!(['t] MySqlTransaction<'t>, this => this.session.lock().await);

/// [`Connector`] opening one [`MySqlExecutor`] per data source.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlConnector;

#[async_trait]
impl Connector for MySqlConnector {
    async fn connect(&self, name: &str, source: &DataSourceConfig) -> OrmResult<Arc<dyn Executor>> {
        let settings = source.settings()?;
        tracing::info!(
            target: "myorm.registry",
            source = name,
            host = %settings.host,
            port = settings.port,
            "connecting to MySQL"
        );
        Ok(Arc::new(MySqlExecutor::from_settings(&settings).await?))
    }
}
