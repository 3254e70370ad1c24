//! Column discovery through `SHOW COLUMNS`.

use crate::adapter::DbAdapter;
use crate::error::{OrmError, OrmResult};
use crate::ident::Ident;
use crate::registry::Registry;
use crate::row::Row;
use crate::value::{Params, Value};
use std::sync::Arc;

const LENGTH_STRING_TYPES: [&str; 4] = ["char", "varchar", "enum", "set"];
const NO_LENGTH_INT_TYPES: [&str; 2] = ["timestamp", "year"];
const FRACTIONAL_TYPES: [&str; 7] = ["decimal", "dec", "numeric", "fixed", "float", "double", "real"];

/// Semantic type a model column is converted to before saving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Str,
    Bool,
}

impl ColumnType {
    /// Map a MySQL column type (`int(11) unsigned`, `varchar(64)`, `text`)
    /// onto a semantic type.
    ///
    /// Fixed and floating point types map to [`ColumnType::Str`] so `"12.50"`
    /// is saved as written; MySQL does the numeric conversion.
    pub fn from_mysql_type(mysql_type: &str) -> Self {
        let main = mysql_type.split_whitespace().next().unwrap_or_default();
        let (name, length) = match main.split_once('(') {
            Some((name, rest)) => (name, rest.trim_end_matches(')')),
            None => (main, ""),
        };
        let name = name.to_ascii_lowercase();
        if FRACTIONAL_TYPES.contains(&name.as_str()) {
            ColumnType::Str
        } else if length.is_empty() || length == "0" {
            if NO_LENGTH_INT_TYPES.contains(&name.as_str()) {
                ColumnType::Int
            } else {
                ColumnType::Str
            }
        } else if name == "tinyint" && length == "1" {
            ColumnType::Bool
        } else if LENGTH_STRING_TYPES.contains(&name.as_str()) {
            ColumnType::Str
        } else {
            ColumnType::Int
        }
    }

    /// Convert a value to this type. NULL stays NULL.
    pub fn convert(self, value: &Value) -> Value {
        if value.is_null() {
            return Value::Null;
        }
        match self {
            ColumnType::Int => Value::Int(match value {
                Value::Int(i) => *i,
                Value::Bool(b) => i64::from(*b),
                Value::Float(f) => f.trunc() as i64,
                Value::Str(s) => leading_int(s),
                Value::Null => 0,
            }),
            ColumnType::Str => Value::Str(match value {
                Value::Str(s) => s.clone(),
                Value::Bool(true) => "1".to_string(),
                Value::Bool(false) => String::new(),
                other => other.to_string(),
            }),
            ColumnType::Bool => Value::Bool(!value.is_blank()),
        }
    }
}

/// Integer prefix of a string, `0` when there is none (`"12abc"` → 12).
fn leading_int(s: &str) -> i64 {
    let s = s.trim_start();
    let sign_len = usize::from(s.starts_with(['-', '+']));
    let digits = s[sign_len..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    s[..sign_len + digits].parse().unwrap_or(0)
}

/// Columns, primary key and auto-increment column of a table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSchema {
    pub columns: Vec<(String, ColumnType)>,
    pub primary_key: Vec<String>,
    pub auto_increment: Option<String>,
}

impl TableSchema {
    /// Build from `SHOW COLUMNS` rows (`Field`, `Type`, `Key`, `Extra`).
    pub fn from_rows(rows: &[Row]) -> OrmResult<Self> {
        let mut schema = TableSchema::default();
        for row in rows {
            let field: String = row.get("Field")?;
            let mysql_type: String = row.get("Type")?;
            schema
                .columns
                .push((field.clone(), ColumnType::from_mysql_type(&mysql_type)));
            if row.value("Key").and_then(Value::as_str) == Some("PRI") {
                schema.primary_key.push(field.clone());
            }
            if row
                .value("Extra")
                .and_then(Value::as_str)
                .is_some_and(|extra| extra.contains("auto_increment"))
            {
                schema.auto_increment = Some(field);
            }
        }
        Ok(schema)
    }

    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, ty)| *ty)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.column_type(column).is_some()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Registry cache key for a table.
    pub fn cache_key(database: Option<&str>, table: &str) -> String {
        format!("{}.{table}.schema", database.unwrap_or_default())
    }

    /// Schema of the adapter's table, from the registry cache unless
    /// `ignore_cache` is set. A fresh lookup always refreshes the cache.
    pub async fn discover(
        registry: &Registry,
        adapter: &DbAdapter,
        ignore_cache: bool,
    ) -> OrmResult<Arc<TableSchema>> {
        let key = Self::cache_key(adapter.database(), adapter.table());
        if !ignore_cache {
            if let Some(schema) = registry.cached_schema(&key) {
                return Ok(schema);
            }
        }

        let target = match adapter.database() {
            Some(db) => format!(
                "{}.{}",
                Ident::quoted(db)?.to_sql(),
                Ident::quoted(adapter.table())?.to_sql()
            ),
            None => Ident::quoted(adapter.table())?.to_sql(),
        };
        let rows = adapter
            .query(&format!("SHOW COLUMNS FROM {target}"), &Params::new())
            .await?
            .into_rows();
        if rows.is_empty() {
            return Err(OrmError::not_found(format!("can not find table '{target}'")));
        }

        let schema = Arc::new(Self::from_rows(&rows)?);
        tracing::debug!(
            target: "myorm.schema",
            table = %target,
            columns = schema.columns.len(),
            "discovered table schema"
        );
        registry.cache_schema(key, schema.clone());
        Ok(schema)
    }
}
