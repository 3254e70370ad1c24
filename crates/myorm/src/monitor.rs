//! Statement monitoring via `tracing`.
//!
//! [`InstrumentedExecutor`] wraps any [`Executor`](crate::Executor) and emits one
//! `tracing` event per statement on target `myorm.sql`:
//!
//! - `query_type`: classification of the statement ([`QueryType`])
//! - `sql`: the statement with its parameters interpolated, truncated
//! - `param_count`, `elapsed_ms`, and `rows` or `error`
//!
//! Statements slower than the configured threshold are reported at `WARN`.
//! An optional [`SqlCollection`] keeps every readable statement for later
//! inspection (debug pages, tests).
//!
//! # Example
//!
//! ```ignore
//! use myorm::{InstrumentedExecutor, MonitorConfig, SqlCollection};
//! use std::time::Duration;
//!
//! let collection = SqlCollection::new();
//! let conn = InstrumentedExecutor::new(executor)
//!     .with_config(MonitorConfig::new().with_slow_query_threshold(Duration::from_millis(200)))
//!     .with_collection(collection.clone());
//! ```

mod instrumented;

pub use instrumented::InstrumentedExecutor;

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::Level;

pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

/// Skip leading whitespace, comments and opening parentheses.
pub(crate) fn strip_sql_prefix(sql: &str) -> &str {
    let mut s = sql;
    loop {
        let before = s;
        s = s.trim_start();
        if s.starts_with("--") || s.starts_with('#') {
            match s.find('\n') {
                Some(pos) => {
                    s = &s[pos + 1..];
                    continue;
                }
                None => return "",
            }
        }
        if s.starts_with("/*") {
            match s.find("*/") {
                Some(pos) => {
                    s = &s[pos + 2..];
                    continue;
                }
                None => return "",
            }
        }
        if let Some(rest) = s.strip_prefix('(') {
            s = rest;
            continue;
        }
        if s == before {
            break;
        }
    }
    s
}

pub(crate) fn starts_with_keyword(s: &str, keyword: &str) -> bool {
    match s.get(0..keyword.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(keyword) => s[keyword.len()..]
            .chars()
            .next()
            .is_none_or(|c| !(c.is_ascii_alphanumeric() || c == '_')),
        _ => false,
    }
}

/// The type of SQL statement being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    /// SELECT, SHOW, DESCRIBE, EXPLAIN and WITH queries
    Select,
    /// INSERT or REPLACE
    Insert,
    Update,
    Delete,
    /// DDL, USE, SET, transaction control and anything else
    Other,
}

impl QueryType {
    /// Classify a statement by its leading keyword.
    pub fn from_sql(sql: &str) -> Self {
        let trimmed = strip_sql_prefix(sql);
        let is = |kw: &str| starts_with_keyword(trimmed, kw);
        if is("SELECT") || is("SHOW") || is("DESCRIBE") || is("DESC") || is("EXPLAIN") || is("WITH") {
            QueryType::Select
        } else if is("INSERT") || is("REPLACE") {
            QueryType::Insert
        } else if is("UPDATE") {
            QueryType::Update
        } else if is("DELETE") {
            QueryType::Delete
        } else {
            QueryType::Other
        }
    }
}

/// Configuration for statement logging.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Statements slower than this are logged at `WARN`.
    pub slow_query_threshold: Option<Duration>,
    /// Truncate logged SQL (in bytes). `None` means no truncation.
    pub max_sql_length: Option<usize>,
    /// Level for ordinary statement events.
    pub level: Level,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            slow_query_threshold: None,
            max_sql_length: Some(200),
            level: Level::DEBUG,
        }
    }
}

impl MonitorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = Some(threshold);
        self
    }

    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub(crate) fn truncate_sql(&self, sql: &str) -> String {
        match self.max_sql_length {
            Some(max) if sql.len() > max => format!("{}...", truncate_sql_bytes(sql, max)),
            _ => sql.to_string(),
        }
    }
}

/// Shared, append-only list of executed statements with their parameters
/// interpolated.
#[derive(Debug, Clone, Default)]
pub struct SqlCollection {
    inner: Arc<Mutex<Vec<String>>>,
}

impl SqlCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, sql: String) {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(sql);
    }

    /// Copy of every statement recorded so far.
    pub fn snapshot(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Remove and return every recorded statement.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(
            &mut *self
                .inner
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests;
