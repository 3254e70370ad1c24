use super::{ModelOptions, TableRef};
use crate::adapter::DbAdapter;
use crate::error::OrmResult;
use crate::ident::Ident;
use crate::qb::{Arg, Where, bind_name};
use crate::registry::Registry;
use crate::row::Row;
use crate::value::Value;

/// Condition-based access to many rows of one table.
#[derive(Debug, Clone)]
pub struct Manager {
    adapter: DbAdapter,
}

impl Manager {
    pub async fn open(registry: &Registry, table: &str, options: ModelOptions) -> OrmResult<Self> {
        let table_ref = TableRef::parse(table)?.with_affixes(&options);
        let adapter = registry
            .adapter(
                options.data_source.as_deref(),
                table_ref.database.as_deref(),
                &table_ref.table,
            )
            .await?;
        Ok(Self::new(adapter))
    }

    pub fn new(adapter: DbAdapter) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &DbAdapter {
        &self.adapter
    }

    /// Rows where `field` equals `value`, or matches it with `LIKE` when
    /// `use_like` is set (the value is then compared as text).
    pub async fn find_by_field(
        &self,
        field: &str,
        value: impl Into<Value>,
        use_like: bool,
    ) -> OrmResult<Vec<Row>> {
        let target = Ident::quoted(field)?.to_sql();
        let name = bind_name(field);
        let mut value = value.into();
        let operator = if use_like {
            value = Value::Str(value.to_string());
            "LIKE"
        } else {
            "="
        };
        let filter = Where::sql(format!("{target} {operator} :{name}")).bind(&name, value);
        self.adapter.select(filter, None, None).await
    }

    pub async fn count(&self, filter: impl Into<Option<Where>>) -> OrmResult<u64> {
        self.adapter.count(filter).await
    }

    pub async fn find(&self, filter: impl Into<Option<Where>>) -> OrmResult<Option<Row>> {
        self.adapter.find(filter).await
    }

    pub async fn select(
        &self,
        filter: impl Into<Option<Where>>,
        offset: Option<i64>,
        length: Option<i64>,
    ) -> OrmResult<Vec<Row>> {
        self.adapter.select(filter, offset, length).await
    }

    pub async fn update<I, K, V>(&self, data: I, filter: impl Into<Option<Where>>) -> OrmResult<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Arg>,
    {
        self.adapter.update(data, filter).await
    }

    pub async fn delete(&self, filter: impl Into<Option<Where>>, limit: Option<i64>) -> OrmResult<u64> {
        self.adapter.delete(filter, limit).await
    }
}
