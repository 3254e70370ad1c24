//! In-memory executor used by unit tests.

use crate::error::{OrmError, OrmResult};
use crate::executor::{Executor, QueryOutcome, Statement};
use crate::row::Row;
use crate::value::Params;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Default)]
struct State {
    statements: Vec<String>,
    params: Vec<Params>,
    rows: VecDeque<Vec<Row>>,
    insert_id: u64,
    affected: u64,
    database: Option<String>,
    /// (default database, statement) for every statement run.
    ran_on: Vec<(Option<String>, String)>,
    fail_next: Option<String>,
}

impl State {
    fn record(&mut self, sql: &str, params: &Params) -> OrmResult<()> {
        self.statements.push(sql.to_string());
        self.params.push(params.clone());
        self.ran_on.push((self.database.clone(), sql.to_string()));
        match self.fail_next.take() {
            Some(message) => Err(OrmError::execution(message)),
            None => Ok(()),
        }
    }

    fn switch(&mut self, name: &str) -> OrmResult<()> {
        if self.database.as_deref() == Some(name) {
            return Ok(());
        }
        self.record(&format!("USE `{name}`"), &Params::new())?;
        self.database = Some(name.to_string());
        Ok(())
    }
}

/// Records every statement and answers with canned results.
#[derive(Default)]
pub(crate) struct RecordingExecutor {
    state: Mutex<State>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a result set for the next SELECT.
    pub fn push_rows(&self, rows: Vec<Row>) -> &Self {
        self.state.lock().unwrap().rows.push_back(rows);
        self
    }

    pub fn set_insert_id(&self, id: u64) -> &Self {
        self.state.lock().unwrap().insert_id = id;
        self
    }

    pub fn set_affected(&self, n: u64) -> &Self {
        self.state.lock().unwrap().affected = n;
        self
    }

    /// Make the next statement fail with an execution error.
    pub fn fail_next(&self, message: &str) -> &Self {
        self.state.lock().unwrap().fail_next = Some(message.to_string());
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }

    /// Each statement paired with the default database it ran on.
    pub fn ran_on(&self) -> Vec<(Option<String>, String)> {
        self.state.lock().unwrap().ran_on.clone()
    }

    pub fn last_params(&self) -> Params {
        self.state
            .lock()
            .unwrap()
            .params
            .last()
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, sql: &str, params: &Params) -> OrmResult<()> {
        self.state.lock().unwrap().record(sql, params)
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn execute(&self, sql: &str) -> OrmResult<u64> {
        self.record(sql, &Params::new())?;
        Ok(self.state.lock().unwrap().affected)
    }

    async fn execute_insert(&self, sql: &str, params: &Params) -> OrmResult<u64> {
        self.record(sql, params)?;
        Ok(self.state.lock().unwrap().insert_id)
    }

    async fn execute_select(&self, sql: &str, params: &Params) -> OrmResult<Vec<Row>> {
        self.record(sql, params)?;
        Ok(self.state.lock().unwrap().rows.pop_front().unwrap_or_default())
    }

    async fn execute_update(&self, sql: &str, params: &Params) -> OrmResult<u64> {
        self.record(sql, params)?;
        Ok(self.state.lock().unwrap().affected)
    }

    async fn execute_delete(&self, sql: &str, params: &Params) -> OrmResult<u64> {
        self.record(sql, params)?;
        Ok(self.state.lock().unwrap().affected)
    }

    async fn use_database(&self, name: &str) -> OrmResult<()> {
        self.state.lock().unwrap().switch(name)
    }

    async fn begin_transaction(&self) -> OrmResult<()> {
        self.record("BEGIN", &Params::new())
    }

    async fn commit(&self) -> OrmResult<()> {
        self.record("COMMIT", &Params::new())
    }

    async fn rollback(&self) -> OrmResult<()> {
        self.record("ROLLBACK", &Params::new())
    }

    /// Switch and statement under one lock of the recorded session.
    async fn run_on(&self, database: Option<&str>, statement: Statement<'_>) -> OrmResult<QueryOutcome> {
        let mut state = self.state.lock().unwrap();
        if let Some(db) = database {
            state.switch(db)?;
        }
        state.record(statement.sql(), statement.params())?;
        Ok(match statement {
            Statement::Select(..) => QueryOutcome::Rows(state.rows.pop_front().unwrap_or_default()),
            Statement::Insert(..) => QueryOutcome::LastInsertId(state.insert_id),
            Statement::Execute(_) | Statement::Update(..) | Statement::Delete(..) => {
                QueryOutcome::Affected(state.affected)
            }
        })
    }
}
