//! Table-bound convenience layer over a [`SqlBuilder`] and an executor.

use crate::error::{OrmError, OrmResult};
use crate::executor::{Executor, Statement};
use crate::ident::Ident;
use crate::monitor::SqlCollection;
use crate::qb::{Arg, SqlBuilder, Where};
use crate::row::Row;
use crate::value::{Params, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

const SYSTEM_DATABASES: [&str; 3] = ["information_schema", "mysql", "performance_schema"];

pub use crate::executor::QueryOutcome;

/// An executor bound to a database and table.
#[derive(Clone)]
pub struct DbAdapter {
    conn: Arc<dyn Executor>,
    database: Option<String>,
    table: String,
    collection: Option<SqlCollection>,
}

impl std::fmt::Debug for DbAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbAdapter")
            .field("database", &self.database)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl DbAdapter {
    pub fn new(conn: Arc<dyn Executor>, database: Option<&str>, table: &str) -> Self {
        Self {
            conn,
            database: database.filter(|d| !d.is_empty()).map(str::to_string),
            table: table.to_string(),
            collection: None,
        }
    }

    pub fn with_collection(mut self, collection: SqlCollection) -> Self {
        self.collection = Some(collection);
        self
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.conn
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn set_table(&mut self, table: impl Into<String>) {
        self.table = table.into();
    }

    /// Readable SQL recorded so far, when statement collection is enabled.
    pub fn debug_sql(&self) -> Vec<String> {
        self.collection
            .as_ref()
            .map(SqlCollection::snapshot)
            .unwrap_or_default()
    }

    /// A builder preset with this adapter's database and table.
    pub fn create_sql(&self) -> SqlBuilder {
        let mut qb = SqlBuilder::new();
        if let Some(db) = &self.database {
            qb.database(db.clone());
        }
        qb.table(self.table.clone());
        qb
    }

    fn filtered(&self, filter: Option<Where>) -> SqlBuilder {
        let mut qb = self.create_sql();
        if let Some(filter) = filter {
            qb.filter(filter);
        }
        qb
    }

    async fn run(&self, statement: Statement<'_>) -> OrmResult<QueryOutcome> {
        self.conn.run_on(self.database(), statement).await
    }

    /// Insert one row; returns the last insert id.
    pub async fn insert<I, K, V>(&self, data: I) -> OrmResult<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Arg>,
    {
        let mut qb = self.create_sql();
        qb.values(data);
        qb.insert(&*self.conn).await
    }

    pub async fn count(&self, filter: impl Into<Option<Where>>) -> OrmResult<u64> {
        self.filtered(filter.into()).count(&*self.conn).await
    }

    /// First matching row, or `None`.
    pub async fn find(&self, filter: impl Into<Option<Where>>) -> OrmResult<Option<Row>> {
        let mut qb = self.filtered(filter.into());
        qb.length(1);
        Ok(qb.select(&*self.conn).await?.into_iter().next())
    }

    /// Matching rows, optionally windowed.
    pub async fn select(
        &self,
        filter: impl Into<Option<Where>>,
        offset: Option<i64>,
        length: Option<i64>,
    ) -> OrmResult<Vec<Row>> {
        let mut qb = self.filtered(filter.into());
        if let Some(offset) = offset {
            qb.offset(offset);
        }
        if let Some(length) = length {
            qb.length(length);
        }
        qb.select(&*self.conn).await
    }

    /// Update matching rows; returns the affected row count.
    pub async fn update<I, K, V>(&self, data: I, filter: impl Into<Option<Where>>) -> OrmResult<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Arg>,
    {
        let mut qb = self.filtered(filter.into());
        qb.values(data);
        qb.update(&*self.conn).await
    }

    /// Delete matching rows, at most `limit` when given.
    pub async fn delete(&self, filter: impl Into<Option<Where>>, limit: Option<i64>) -> OrmResult<u64> {
        let mut qb = self.filtered(filter.into());
        if let Some(limit) = limit {
            qb.length(limit);
        }
        qb.delete(&*self.conn).await
    }

    /// Run arbitrary SQL; the result follows the statement kind.
    pub async fn query(&self, sql: &str, params: &Params) -> OrmResult<QueryOutcome> {
        self.run(Statement::classify(sql, params)).await
    }

    /// Run a row-returning query and key the rows by `column`. Later rows
    /// win on duplicate keys.
    pub async fn query_keyed(
        &self,
        sql: &str,
        params: &Params,
        column: &str,
    ) -> OrmResult<BTreeMap<String, Row>> {
        let rows = self.query(sql, params).await?.into_rows();
        let mut keyed = BTreeMap::new();
        for row in rows {
            let key = row
                .value(column)
                .ok_or_else(|| OrmError::decode(column, "index column not present in row"))?
                .to_string();
            keyed.insert(key, row);
        }
        Ok(keyed)
    }

    /// Run a statement without parameters.
    pub async fn cmd(&self, sql: &str) -> OrmResult<u64> {
        Ok(self.run(Statement::Execute(sql)).await?.into_count())
    }

    /// Databases on the server, system schemas excluded.
    pub async fn database_list(&self) -> OrmResult<Vec<String>> {
        let rows = self.conn.execute_select("SHOW DATABASES", &Params::new()).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.value("Database").map(Value::to_string))
            .filter(|db| !SYSTEM_DATABASES.contains(&db.as_str()))
            .collect())
    }

    /// Tables of `database`, or of the adapter's database when `None`.
    pub async fn table_list(&self, database: Option<&str>) -> OrmResult<Vec<String>> {
        let sql = match database.filter(|d| !d.is_empty()) {
            Some(db) => format!("SHOW TABLES FROM {}", Ident::parse(db)?.to_sql()),
            None => "SHOW TABLES".to_string(),
        };
        let params = Params::new();
        let rows = self.run(Statement::Select(&sql, &params)).await?.into_rows();
        Ok(rows
            .into_iter()
            .flat_map(|row| row.into_iter().map(|(_, v)| v.to_string()))
            .collect())
    }

    /// Begin a transaction on the shared executor.
    ///
    /// Other tasks using the same executor are not held off until
    /// [`DbAdapter::trans_commit`]; their statements can land inside this
    /// transaction. Use [`transaction!`](crate::transaction) for exclusive use
    /// of the session.
    pub async fn trans_start(&self) -> OrmResult<()> {
        if let Some(db) = &self.database {
            self.conn.use_database(db).await?;
        }
        self.conn.begin_transaction().await
    }

    pub async fn trans_commit(&self) -> OrmResult<()> {
        self.conn.commit().await
    }

    pub async fn trans_rollback(&self) -> OrmResult<()> {
        self.conn.rollback().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::RecordingExecutor;

    fn adapter() -> (Arc<RecordingExecutor>, DbAdapter) {
        let conn = Arc::new(RecordingExecutor::new());
        let adapter = DbAdapter::new(conn.clone(), Some("app"), "user");
        (conn, adapter)
    }

    #[tokio::test]
    async fn find_limits_to_one_and_switches_database() {
        let (conn, adapter) = adapter();
        conn.push_rows(vec![Row::new().with("id", 1)]);
        let row = adapter.find(Where::and([("id", 1)])).await.unwrap();
        assert_eq!(row.unwrap().get::<i64>("id").unwrap(), 1);
        assert_eq!(
            conn.statements(),
            vec!["USE `app`", "SELECT * FROM `user` WHERE id = :id LIMIT 1"]
        );
    }

    #[tokio::test]
    async fn find_without_match_is_none() {
        let (_conn, adapter) = adapter();
        assert!(adapter.find(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn select_window_and_delete_limit() {
        let (conn, adapter) = adapter();
        adapter.select(None, Some(20), Some(10)).await.unwrap();
        adapter.delete(Where::sql("age > :age").bind("age", 90), None).await.unwrap();
        adapter.delete(None, Some(0)).await.unwrap();
        let statements = conn.statements();
        assert_eq!(statements[1], "SELECT * FROM `user` LIMIT 10 OFFSET 20");
        assert_eq!(statements[2], "DELETE FROM `user` WHERE age > :age");
        assert_eq!(statements[3], "DELETE FROM `user` LIMIT 0");
    }

    #[tokio::test]
    async fn insert_and_update() {
        let (conn, adapter) = adapter();
        conn.set_insert_id(42).set_affected(3);
        let id = adapter.insert([("name", Arg::from("Ann")), ("age", Arg::from(30))]).await.unwrap();
        assert_eq!(id, 42);
        let n = adapter
            .update([("age", 31)], Where::and([("name", "Ann")]))
            .await
            .unwrap();
        assert_eq!(n, 3);
        let statements = conn.statements();
        assert_eq!(statements[1], "INSERT INTO `user` (`name`, `age`) VALUES (:ins_name, :ins_age)");
        assert_eq!(statements[2], "UPDATE `user` SET `age` = :upd_age WHERE name = :name");
    }

    #[tokio::test]
    async fn count_reads_cnt_column() {
        let (conn, adapter) = adapter();
        conn.push_rows(vec![Row::new().with("cnt", 12)]);
        assert_eq!(adapter.count(None).await.unwrap(), 12);
        assert_eq!(conn.statements()[1], "SELECT COUNT(1) AS cnt FROM `user`");
    }

    #[tokio::test]
    async fn query_dispatches_by_statement_kind() {
        let (conn, adapter) = adapter();
        conn.set_insert_id(7).set_affected(2);
        let params = Params::new().with("n", "x");
        assert_eq!(
            adapter.query("INSERT INTO t (n) VALUES (:n)", &params).await.unwrap(),
            QueryOutcome::LastInsertId(7)
        );
        assert_eq!(
            adapter.query("UPDATE t SET n = :n", &params).await.unwrap(),
            QueryOutcome::Affected(2)
        );
        conn.push_rows(vec![
            Row::new().with("id", 1).with("n", "a"),
            Row::new().with("id", 2).with("n", "b"),
        ]);
        let keyed = adapter.query_keyed("SELECT id, n FROM t", &Params::new(), "id").await.unwrap();
        assert_eq!(keyed["2"].get::<String>("n").unwrap(), "b");
    }

    #[tokio::test]
    async fn database_list_hides_system_schemas() {
        let (conn, adapter) = adapter();
        conn.push_rows(vec![
            Row::new().with("Database", "app"),
            Row::new().with("Database", "mysql"),
            Row::new().with("Database", "information_schema"),
            Row::new().with("Database", "performance_schema"),
            Row::new().with("Database", "logs"),
        ]);
        assert_eq!(adapter.database_list().await.unwrap(), vec!["app", "logs"]);
    }

    #[tokio::test]
    async fn table_list_quotes_database() {
        let (conn, adapter) = adapter();
        conn.push_rows(vec![Row::new().with("Tables_in_logs", "events")]);
        assert_eq!(adapter.table_list(Some("logs")).await.unwrap(), vec!["events"]);
        assert_eq!(conn.statements()[1], "SHOW TABLES FROM `logs`");
        assert!(adapter.table_list(Some("logs; DROP")).await.is_err());
    }

    #[tokio::test]
    async fn execution_errors_propagate() {
        let (conn, adapter) = adapter();
        conn.use_database("app").await.unwrap();
        conn.fail_next("server gone");
        let err = adapter.select(None, None, None).await.unwrap_err();
        assert!(matches!(err, OrmError::Execution(_)));
    }
}
