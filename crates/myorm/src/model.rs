//! Single-row records over a discovered table schema.
//!
//! A [`Model`] keeps only the columns its [`TableSchema`] declares. Reading
//! or writing any other column is an error. [`Model::save`] updates when the
//! whole primary key is filled and inserts otherwise, capturing the
//! auto-increment id. JSON columns are written as a `JSON_SET` patch when only
//! some paths were altered through [`JsonColumn::alter`].
//!
//! ```ignore
//! let mut user = Model::open(&registry, "app.user", ModelOptions::new()).await?;
//! if user.load(5).await? {
//!     user.set("name", "Ann")?;
//!     user.json_mut("settings")?.alter("theme.color", "dark")?;
//!     user.save().await?;
//! }
//! ```

mod json_column;
mod manager;
mod schema;

pub use json_column::JsonColumn;
pub use manager::Manager;
pub use schema::{ColumnType, TableSchema};

use crate::adapter::DbAdapter;
use crate::error::{OrmError, OrmResult};
use crate::ident::Ident;
use crate::qb::{Arg, Where, bind_name};
use crate::registry::Registry;
use crate::row::{FromRow, Row};
use crate::value::Value;
use std::sync::Arc;

/// `"db.table"` or `"table"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub database: Option<String>,
    pub table: String,
}

impl TableRef {
    pub fn parse(s: &str) -> OrmResult<Self> {
        let segments: Vec<&str> = s.split('.').collect();
        match segments.as_slice() {
            [table] if !table.is_empty() => Ok(Self {
                database: None,
                table: table.to_string(),
            }),
            [db, table] if !db.is_empty() && !table.is_empty() => Ok(Self {
                database: Some(db.to_string()),
                table: table.to_string(),
            }),
            _ => Err(OrmError::validation(format!(
                "table reference '{s}' must look like 'table' or 'database.table'"
            ))),
        }
    }

    /// Apply the table name prefix and suffix from `options`.
    pub fn with_affixes(mut self, options: &ModelOptions) -> Self {
        self.table = format!("{}{}{}", options.prefix, self.table, options.suffix);
        self
    }
}

/// Options shared by [`Model`] and [`Manager`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelOptions {
    /// Data source name; the registry default when `None`.
    pub data_source: Option<String>,
    pub prefix: String,
    pub suffix: String,
    /// Skip the schema cache and query `SHOW COLUMNS` directly.
    pub ignore_cache: bool,
}

impl ModelOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data_source(mut self, name: impl Into<String>) -> Self {
        self.data_source = Some(name.into());
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn ignore_cache(mut self, ignore: bool) -> Self {
        self.ignore_cache = ignore;
        self
    }
}

/// What [`Model::save`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Updated by primary key; carries the affected row count.
    Updated(u64),
    /// Inserted; carries the new auto-increment id.
    Inserted(u64),
    /// Inserted into a table without an auto-increment column.
    InsertedWithoutId,
}

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Value(Value),
    Json(JsonColumn),
}

impl Cell {
    fn from_value(value: Value) -> Self {
        match value.as_str().and_then(JsonColumn::parse) {
            Some(json) => Cell::Json(json),
            None => Cell::Value(value),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Cell::Value(v) => v.clone(),
            Cell::Json(json) => Value::Str(json.to_json_string()),
        }
    }
}

/// A single table row bound to a schema.
#[derive(Debug, Clone)]
pub struct Model {
    adapter: DbAdapter,
    schema: Arc<TableSchema>,
    cells: Vec<(String, Cell)>,
}

impl Model {
    /// Open a model for `table` (`"table"` or `"db.table"`), discovering its
    /// schema through the registry.
    pub async fn open(registry: &Registry, table: &str, options: ModelOptions) -> OrmResult<Self> {
        let table_ref = TableRef::parse(table)?.with_affixes(&options);
        let adapter = registry
            .adapter(
                options.data_source.as_deref(),
                table_ref.database.as_deref(),
                &table_ref.table,
            )
            .await?;
        let schema = TableSchema::discover(registry, &adapter, options.ignore_cache).await?;
        Ok(Self::with_schema(adapter, schema))
    }

    pub fn with_schema(adapter: DbAdapter, schema: Arc<TableSchema>) -> Self {
        Self {
            adapter,
            schema,
            cells: Vec::new(),
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn adapter(&self) -> &DbAdapter {
        &self.adapter
    }

    /// Load the row whose auto-increment column equals `id`. Returns `false`
    /// (and leaves the model empty) when no row matches.
    pub async fn load(&mut self, id: impl Into<Value>) -> OrmResult<bool> {
        let Some(column) = self.schema.auto_increment.clone() else {
            return Err(OrmError::validation(format!(
                "table '{}' has no auto-increment column to load by",
                self.adapter.table()
            )));
        };
        let id = id.into();
        let id = match &id {
            Value::Int(i) => *i,
            Value::Str(s) if s.parse::<i64>().is_ok_and(|i| i.to_string() == *s) => {
                s.parse().unwrap_or_default()
            }
            other => {
                return Err(OrmError::validation(format!(
                    "instance {column} input '{other}' is illegal"
                )));
            }
        };
        self.reset_data();
        let filter = key_condition([(column.as_str(), Value::Int(id))])?;
        self.bind_by(filter).await
    }

    /// Load the first row matching `filter`.
    pub async fn bind_by(&mut self, filter: impl Into<Where>) -> OrmResult<bool> {
        self.reset_data();
        match self.adapter.find(filter.into()).await? {
            Some(row) => {
                self.set_data(row);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Replace the model data. Columns outside the schema are skipped; JSON
    /// object or array text becomes a [`JsonColumn`].
    pub fn set_data<I, K, V>(&mut self, data: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.reset_data();
        for (column, value) in data {
            let column = column.into();
            if self.schema.contains(&column) {
                self.put(column, Cell::from_value(value.into()));
            }
        }
        self
    }

    pub fn reset_data(&mut self) -> &mut Self {
        self.cells.clear();
        self
    }

    /// Current data as a row, JSON columns rendered as text.
    pub fn data(&self) -> Row {
        self.cells
            .iter()
            .map(|(column, cell)| (column.clone(), cell.to_value()))
            .collect()
    }

    /// Map the current data onto a typed record.
    pub fn to_record<T: FromRow>(&self) -> OrmResult<T> {
        T::from_row(&self.data())
    }

    fn check_column(&self, column: &str) -> OrmResult<()> {
        if self.schema.contains(column) {
            Ok(())
        } else {
            Err(OrmError::validation(format!(
                "the property '{column}' not exists in table '{}'",
                self.adapter.table()
            )))
        }
    }

    fn put(&mut self, column: String, cell: Cell) {
        match self.cells.iter_mut().find(|(c, _)| *c == column) {
            Some(entry) => entry.1 = cell,
            None => self.cells.push((column, cell)),
        }
    }

    /// Value of a schema column, `None` when unset.
    pub fn get(&self, column: &str) -> OrmResult<Option<Value>> {
        self.check_column(column)?;
        Ok(self
            .cells
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, cell)| cell.to_value()))
    }

    /// Set a schema column. Setting a JSON column replaces its document.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> OrmResult<&mut Self> {
        self.check_column(column)?;
        self.put(column.to_string(), Cell::from_value(value.into()));
        Ok(self)
    }

    /// Set a schema column to a JSON document.
    pub fn set_json(&mut self, column: &str, doc: serde_json::Value) -> OrmResult<&mut Self> {
        self.check_column(column)?;
        self.put(column.to_string(), Cell::Json(JsonColumn::new(doc)));
        Ok(self)
    }

    /// JSON column for path-level edits. An unset or NULL column starts as an
    /// empty object.
    pub fn json_mut(&mut self, column: &str) -> OrmResult<&mut JsonColumn> {
        self.check_column(column)?;
        let index = match self.cells.iter().position(|(c, _)| c == column) {
            Some(index) => index,
            None => {
                self.cells.push((column.to_string(), Cell::Value(Value::Null)));
                self.cells.len() - 1
            }
        };
        let cell = &mut self.cells[index].1;
        if let Cell::Value(value) = cell {
            let json = match value {
                Value::Null => JsonColumn::new(serde_json::Value::Object(Default::default())),
                other => {
                    return Err(OrmError::validation(format!(
                        "column '{column}' holds '{other}', not a JSON document"
                    )));
                }
            };
            *cell = Cell::Json(json);
        }
        match cell {
            Cell::Json(json) => Ok(json),
            Cell::Value(_) => Err(OrmError::validation(format!(
                "column '{column}' is not a JSON document"
            ))),
        }
    }

    fn primary_key_filled(&self) -> bool {
        !self.schema.primary_key.is_empty()
            && self.schema.primary_key.iter().all(|pk| {
                self.cells
                    .iter()
                    .find(|(c, _)| c == pk)
                    .is_some_and(|(_, cell)| !cell.to_value().is_blank())
            })
    }

    /// Insert or update the row.
    pub async fn save(&mut self) -> OrmResult<SaveOutcome> {
        let pk_filled = self.primary_key_filled();
        let mut data: Vec<(String, Arg)> = Vec::with_capacity(self.cells.len());
        for (column, cell) in &self.cells {
            let arg = match cell {
                Cell::Json(json) => json.to_arg(pk_filled),
                Cell::Value(value) => match self.schema.column_type(column) {
                    Some(ty) => Arg::Value(ty.convert(value)),
                    None => Arg::Value(value.clone()),
                },
            };
            data.push((column.clone(), arg));
        }

        let outcome = if pk_filled {
            let keys = self
                .schema
                .primary_key
                .iter()
                .map(|pk| {
                    let value = self.get(pk)?.unwrap_or(Value::Null);
                    Ok((pk.as_str(), value))
                })
                .collect::<OrmResult<Vec<_>>>()?;
            let filter = key_condition(keys)?;
            SaveOutcome::Updated(self.adapter.update(data, filter).await?)
        } else if let Some(column) = self.schema.auto_increment.clone() {
            let id = self.adapter.insert(data).await?;
            let id_value = i64::try_from(id).map(Value::Int).unwrap_or_else(|_| Value::from(id));
            self.put(column, Cell::Value(id_value));
            SaveOutcome::Inserted(id)
        } else {
            self.adapter.insert(data).await?;
            SaveOutcome::InsertedWithoutId
        };

        for (_, cell) in &mut self.cells {
            if let Cell::Json(json) = cell {
                json.clear_patch();
            }
        }
        tracing::debug!(
            target: "myorm.model",
            table = self.adapter.table(),
            outcome = ?outcome,
            "saved model"
        );
        Ok(outcome)
    }
}

/// `` `a` = :a AND `b` = :b `` over key columns.
fn key_condition<'a>(keys: impl IntoIterator<Item = (&'a str, Value)>) -> OrmResult<Where> {
    let mut fragments = Vec::new();
    let mut filter_params = Vec::new();
    for (column, value) in keys {
        let name = bind_name(column);
        fragments.push(format!("{} = :{name}", Ident::quoted(column)?.to_sql()));
        filter_params.push((name, value));
    }
    let mut filter = Where::sql(fragments.join(" AND "));
    for (name, value) in filter_params {
        filter = filter.bind(&name, value);
    }
    Ok(filter)
}
