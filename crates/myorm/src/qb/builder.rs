//! The stateful SQL builder.
//!
//! A [`SqlBuilder`] accumulates clause state through chainable setters and
//! compiles it into one statement plus its named parameters. Building never
//! consumes state: the same configuration always yields the same SQL, except
//! that every [`Action::Union`] build bumps a counter which suffixes bound
//! names (`:id` → `:id_union1`) so both sides of a UNION can share a map.

use crate::error::{OrmError, OrmResult};
use crate::executor::{Executor, QueryOutcome, Statement};
use crate::ident::{json_path, quote_target};
use crate::placeholder;
use crate::qb::arg::Arg;
use crate::qb::condition::{Condition, Where, bind_name, normalize, unique_key};
use crate::qb::expr::Expr;
use crate::row::Row;
use crate::value::{Params, Value};

/// Statement kind to compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Select,
    /// A SELECT meant to be the right-hand side of a UNION.
    Union,
    Insert,
    Update,
    Delete,
}

impl Action {
    fn name(self) -> &'static str {
        match self {
            Action::Select => "select",
            Action::Union => "union",
            Action::Insert => "insert",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

/// A compiled statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Built {
    pub sql: String,
    pub params: Params,
}

/// A select-list entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// Column name or expression text, quoted when it is a bare name.
    Name(String),
    /// `` `column`->>'$.path' ``
    Json { column: String, path: String },
    /// Rendered verbatim.
    Expr(Expr),
}

impl Field {
    pub fn json(column: impl Into<String>, path: impl Into<String>) -> Self {
        Field::Json {
            column: column.into(),
            path: path.into(),
        }
    }

    fn to_sql(&self) -> String {
        match self {
            Field::Name(name) => quote_target(name),
            Field::Json { column, path } => {
                format!("{}->>'{}'", quote_target(column), json_path(path))
            }
            Field::Expr(e) => e.render(),
        }
    }
}

impl From<&str> for Field {
    fn from(s: &str) -> Self {
        Field::Name(s.to_string())
    }
}

impl From<String> for Field {
    fn from(s: String) -> Self {
        Field::Name(s)
    }
}

impl From<Expr> for Field {
    fn from(e: Expr) -> Self {
        Field::Expr(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinType {
    #[default]
    Inner,
    Cross,
    Left,
    Right,
    Natural,
    NaturalLeft,
    NaturalRight,
}

impl JoinType {
    fn keyword(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Cross => "CROSS JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Natural => "NATURAL JOIN",
            JoinType::NaturalLeft => "NATURAL LEFT JOIN",
            JoinType::NaturalRight => "NATURAL RIGHT JOIN",
        }
    }
}

/// Sort direction. `Unspecified` leaves the server default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
    Unspecified,
}

impl Direction {
    fn keyword(self) -> Option<&'static str> {
        match self {
            Direction::Asc => Some("ASC"),
            Direction::Desc => Some("DESC"),
            Direction::Unspecified => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct JoinClause {
    kind: JoinType,
    table: String,
    alias: Option<String>,
    on: String,
}

#[derive(Debug, Clone, PartialEq)]
struct TableTarget {
    name: String,
    alias: Option<String>,
}

/// Fluent builder for SELECT/INSERT/UPDATE/DELETE statements.
///
/// ```
/// use myorm::{Action, SqlBuilder, Where};
///
/// let mut qb = SqlBuilder::new();
/// qb.table("user")
///     .fields(["first_name", "last_name"])
///     .filter(Where::and([("first_name", "Name")]));
/// let built = qb.build_sql(Action::Select)?;
/// assert_eq!(
///     built.sql,
///     "SELECT `first_name`, `last_name` FROM `user` WHERE first_name = :first_name"
/// );
/// # Ok::<(), myorm::OrmError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct SqlBuilder {
    database: Option<String>,
    table: Option<TableTarget>,
    fields: Vec<Field>,
    joins: Vec<JoinClause>,
    filter: Option<Where>,
    group: Vec<String>,
    having: Option<String>,
    order: Vec<(String, Direction)>,
    limit: Option<i64>,
    offset: Option<i64>,
    data: Vec<(String, Arg)>,
    union_count: u32,
}

impl SqlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Database to switch to before executing.
    pub fn database(&mut self, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        self.database = (!name.is_empty()).then_some(name);
        self
    }

    pub fn table(&mut self, name: impl Into<String>) -> &mut Self {
        self.table = Some(TableTarget {
            name: name.into(),
            alias: None,
        });
        self
    }

    pub fn table_as(&mut self, name: impl Into<String>, alias: impl Into<String>) -> &mut Self {
        let alias = alias.into();
        self.table = Some(TableTarget {
            name: name.into(),
            alias: (!alias.is_empty()).then_some(alias),
        });
        self
    }

    /// Append one select-list entry.
    pub fn field(&mut self, field: impl Into<Field>) -> &mut Self {
        self.fields.push(field.into());
        self
    }

    /// Append several select-list entries.
    pub fn fields<I, F>(&mut self, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Field>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn join(&mut self, kind: JoinType, table: impl Into<String>, on: impl Into<String>) -> &mut Self {
        self.joins.push(JoinClause {
            kind,
            table: table.into(),
            alias: None,
            on: on.into(),
        });
        self
    }

    pub fn join_as(
        &mut self,
        kind: JoinType,
        table: impl Into<String>,
        alias: impl Into<String>,
        on: impl Into<String>,
    ) -> &mut Self {
        let alias = alias.into();
        self.joins.push(JoinClause {
            kind,
            table: table.into(),
            alias: (!alias.is_empty()).then_some(alias),
            on: on.into(),
        });
        self
    }

    /// Set the WHERE condition, replacing any previous one.
    pub fn filter(&mut self, filter: impl Into<Where>) -> &mut Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn group(&mut self, column: impl Into<String>) -> &mut Self {
        self.group.push(column.into());
        self
    }

    /// HAVING is only emitted together with a GROUP BY.
    pub fn having(&mut self, having: impl Into<String>) -> &mut Self {
        self.having = Some(having.into());
        self
    }

    /// Add a sort key. Re-ordering by a known key keeps its position and
    /// updates the direction.
    pub fn order(&mut self, field: impl Into<String>, direction: Direction) -> &mut Self {
        let field = field.into();
        let key = field.trim().to_string();
        match self.order.iter_mut().find(|(f, _)| *f == key) {
            Some(entry) => entry.1 = direction,
            None => self.order.push((key, direction)),
        }
        self
    }

    /// Rows to skip. Negative values clear the offset.
    pub fn offset(&mut self, offset: i64) -> &mut Self {
        self.offset = (offset >= 0).then_some(offset);
        self
    }

    /// Row limit. `0` is a real limit; negative values clear it.
    pub fn length(&mut self, length: i64) -> &mut Self {
        self.limit = (length >= 0).then_some(length);
        self
    }

    /// Set one column for INSERT/UPDATE. A column set twice keeps its
    /// position and takes the latest value.
    pub fn data(&mut self, column: impl Into<String>, value: impl Into<Arg>) -> &mut Self {
        let column = column.into();
        let value = value.into();
        match self.data.iter_mut().find(|(c, _)| *c == column) {
            Some(entry) => entry.1 = value,
            None => self.data.push((column, value)),
        }
        self
    }

    pub fn values<I, K, V>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Arg>,
    {
        for (column, value) in values {
            self.data(column, value);
        }
        self
    }

    /// Clear all state, including the union counter. The database is kept.
    pub fn reset(&mut self) -> &mut Self {
        let database = self.database.take();
        *self = Self {
            database,
            ..Self::default()
        };
        self
    }

    pub fn table_name(&self) -> Option<&str> {
        self.table.as_ref().map(|t| t.name.as_str())
    }

    pub fn database_name(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Compile the current state into SQL and parameters.
    pub fn build_sql(&mut self, action: Action) -> OrmResult<Built> {
        self.validate(action)?;
        if action == Action::Union {
            self.union_count += 1;
        }
        self.compile(action, None)
    }

    fn validate(&self, action: Action) -> OrmResult<()> {
        if self.table.as_ref().is_none_or(|t| t.name.is_empty()) {
            return Err(OrmError::build(
                "Empty target when executing query in SQLBuilder",
            ));
        }
        if matches!(action, Action::Insert | Action::Update) && self.data.is_empty() {
            return Err(OrmError::build(format!(
                "Empty data when executing {} query in SQLBuilder",
                action.name()
            )));
        }
        Ok(())
    }

    fn compile(&self, action: Action, fields: Option<&[Field]>) -> OrmResult<Built> {
        self.validate(action)?;
        let mut params = Params::new();
        let mut segments: Vec<String> = Vec::new();

        match action {
            Action::Insert => {
                let (columns, values) = self.insert_data(&mut params)?;
                segments.push(format!("INSERT INTO {}", self.table_sql()));
                segments.push(format!("({columns})"));
                segments.push("VALUES".to_string());
                segments.push(format!("({values})"));
            }
            Action::Select | Action::Union => {
                segments.push(format!("SELECT {}", field_list(fields.unwrap_or(&self.fields))));
                segments.push(format!("FROM {}", self.table_sql()));
                segments.push(self.alias_sql());
                segments.push(self.join_sql());
                segments.push(self.where_sql(&mut params)?);
                segments.push(self.group_sql());
                segments.push(self.having_sql());
                segments.push(self.order_sql());
                segments.push(self.limit_sql());
                segments.push(self.offset_sql());
            }
            Action::Update => {
                // WHERE binds first so SET values never take over its names.
                let filter = self.where_sql(&mut params)?;
                let assignments = self.update_data(&mut params)?;
                segments.push(format!("UPDATE {}", self.table_sql()));
                segments.push(format!("SET {assignments}"));
                segments.push(filter);
                segments.push(self.order_sql());
                segments.push(self.limit_sql());
            }
            Action::Delete => {
                segments.push(format!("DELETE FROM {}", self.table_sql()));
                segments.push(self.where_sql(&mut params)?);
                segments.push(self.order_sql());
                segments.push(self.limit_sql());
            }
        }

        segments.retain(|s| !s.is_empty());
        Ok(Built {
            sql: segments.join(" "),
            params,
        })
    }

    fn table_sql(&self) -> String {
        self.table
            .as_ref()
            .map(|t| quote_target(&t.name))
            .unwrap_or_default()
    }

    fn alias_sql(&self) -> String {
        match self.table.as_ref().and_then(|t| t.alias.as_deref()) {
            Some(alias) => format!("AS {}", quote_target(alias)),
            None => String::new(),
        }
    }

    fn join_sql(&self) -> String {
        self.joins
            .iter()
            .map(|j| {
                let mut out = format!("{} {}", j.kind.keyword(), quote_target(&j.table));
                if let Some(alias) = &j.alias {
                    out.push_str(" AS ");
                    out.push_str(&quote_target(alias));
                }
                if !j.on.trim().is_empty() {
                    out.push_str(" ON ");
                    out.push_str(&j.on);
                }
                out
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn where_sql(&self, params: &mut Params) -> OrmResult<String> {
        let Some(filter) = &self.filter else {
            return Ok(String::new());
        };
        let condition = normalize(filter)?;
        if condition.is_empty() {
            return Ok(String::new());
        }
        let condition = self.suffix_for_union(condition)?;
        params.extend(condition.params);
        Ok(format!("WHERE {}", condition.fragment))
    }

    /// Rename bound placeholders to `:name_union{n}` in both the fragment and
    /// the parameter map.
    fn suffix_for_union(&self, condition: Condition) -> OrmResult<Condition> {
        if self.union_count == 0 {
            return Ok(condition);
        }
        if condition.params.positional_len() > 0 || placeholder::has_positional(&condition.fragment) {
            return Err(OrmError::build(
                "Positional parameters cannot be used in a UNION query; use named parameters",
            ));
        }
        let suffix = format!("_union{}", self.union_count);
        let fragment = placeholder::rewrite(&condition.fragment, |ph| match &ph.kind {
            placeholder::Kind::Named(name) if condition.params.contains(name) => {
                Ok(Some(format!("{name}{suffix}")))
            }
            _ => Ok(None),
        })?;
        let params = condition
            .params
            .into_iter()
            .map(|(key, value)| (format!("{key}{suffix}"), value))
            .collect();
        Ok(Condition { fragment, params })
    }

    fn group_sql(&self) -> String {
        if self.group.is_empty() {
            return String::new();
        }
        let cols: Vec<String> = self.group.iter().map(|g| quote_target(g)).collect();
        format!("GROUP BY {}", cols.join(", "))
    }

    fn having_sql(&self) -> String {
        match &self.having {
            Some(having) if !self.group.is_empty() && !having.trim().is_empty() => {
                format!("HAVING {having}")
            }
            _ => String::new(),
        }
    }

    fn order_sql(&self) -> String {
        if self.order.is_empty() {
            return String::new();
        }
        let keys: Vec<String> = self
            .order
            .iter()
            .map(|(field, dir)| match dir.keyword() {
                Some(kw) => format!("{} {kw}", quote_target(field)),
                None => quote_target(field),
            })
            .collect();
        format!("ORDER BY {}", keys.join(", "))
    }

    fn limit_sql(&self) -> String {
        self.limit.map(|n| format!("LIMIT {n}")).unwrap_or_default()
    }

    fn offset_sql(&self) -> String {
        self.offset.map(|n| format!("OFFSET {n}")).unwrap_or_default()
    }

    fn insert_data(&self, params: &mut Params) -> OrmResult<(String, String)> {
        let mut columns = Vec::with_capacity(self.data.len());
        let mut values = Vec::with_capacity(self.data.len());
        for (column, arg) in &self.data {
            columns.push(quote_target(column));
            match arg {
                Arg::Expr(e) => values.push(e.render()),
                other => {
                    let key = unique_key(params, format!(":ins_{}", bind_name(column)));
                    params.insert(&key, other.to_bound()?);
                    values.push(key);
                }
            }
        }
        Ok((columns.join(", "), values.join(", ")))
    }

    fn update_data(&self, params: &mut Params) -> OrmResult<String> {
        let mut assignments = Vec::with_capacity(self.data.len());
        for (column, arg) in &self.data {
            let target = quote_target(column);
            match arg {
                Arg::Paths(entries) if !entries.is_empty() => {
                    let mut call = vec![target.clone()];
                    for (path, value) in entries {
                        call.push(format!("'{}'", json_path(path)));
                        match value {
                            Arg::Expr(e) => call.push(e.render()),
                            Arg::Value(v) => {
                                let key = update_key(params, &format!("{column}.{path}"));
                                params.insert(&key, v.clone());
                                call.push(key);
                            }
                            doc @ (Arg::Json(_) | Arg::Paths(_)) => {
                                let key = update_key(params, &format!("{column}.{path}"));
                                params.insert(&key, doc.to_bound()?);
                                call.push(format!("CAST({key} AS JSON)"));
                            }
                        }
                    }
                    assignments.push(format!("{target} = JSON_SET({})", call.join(", ")));
                }
                Arg::Expr(e) => assignments.push(format!("{target} = {e}")),
                other => {
                    let key = update_key(params, column);
                    params.insert(&key, other.to_bound()?);
                    assignments.push(format!("{target} = {key}"));
                }
            }
        }
        Ok(assignments.join(", "))
    }
}

fn update_key(params: &Params, target: &str) -> String {
    unique_key(params, format!(":upd_{}", bind_name(target)))
}

fn field_list(fields: &[Field]) -> String {
    if fields.is_empty() {
        return "*".to_string();
    }
    fields
        .iter()
        .map(Field::to_sql)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Right-hand side of [`SqlBuilder::union`].
pub enum UnionWith<'a> {
    Builder(&'a mut SqlBuilder),
    Sql { sql: String, params: Params },
}

impl<'a> From<&'a mut SqlBuilder> for UnionWith<'a> {
    fn from(qb: &'a mut SqlBuilder) -> Self {
        UnionWith::Builder(qb)
    }
}

// Execution
impl SqlBuilder {
    /// Run on this builder's database. The switch and the statement go to the
    /// executor together.
    async fn run(&self, conn: &dyn Executor, statement: Statement<'_>) -> OrmResult<QueryOutcome> {
        conn.run_on(self.database.as_deref(), statement).await
    }

    /// Run the SELECT and return every row (an empty vec when nothing matches).
    pub async fn select(&self, conn: &dyn Executor) -> OrmResult<Vec<Row>> {
        let built = self.compile(Action::Select, None)?;
        let outcome = self.run(conn, Statement::Select(&built.sql, &built.params)).await?;
        Ok(outcome.into_rows())
    }

    /// `SELECT COUNT(1) AS cnt ...` over the current state. The configured
    /// field list is left untouched.
    pub async fn count(&self, conn: &dyn Executor) -> OrmResult<u64> {
        let count_field = [Field::Name("COUNT(1) AS cnt".to_string())];
        let built = self.compile(Action::Select, Some(&count_field))?;
        let rows = self
            .run(conn, Statement::Select(&built.sql, &built.params))
            .await?
            .into_rows();
        let Some(row) = rows.first() else {
            return Ok(0);
        };
        match row.value("cnt") {
            Some(Value::Null) | None => Ok(0),
            Some(v) => v
                .as_i64()
                .and_then(|n| u64::try_from(n).ok())
                .ok_or_else(|| OrmError::decode("cnt", format!("expected a count, got {v}"))),
        }
    }

    /// Run the INSERT and return the last insert id.
    pub async fn insert(&self, conn: &dyn Executor) -> OrmResult<u64> {
        let built = self.compile(Action::Insert, None)?;
        let outcome = self.run(conn, Statement::Insert(&built.sql, &built.params)).await?;
        Ok(outcome.into_count())
    }

    /// Run the UPDATE and return the affected row count.
    pub async fn update(&self, conn: &dyn Executor) -> OrmResult<u64> {
        let built = self.compile(Action::Update, None)?;
        let outcome = self.run(conn, Statement::Update(&built.sql, &built.params)).await?;
        Ok(outcome.into_count())
    }

    /// Run the DELETE and return the affected row count.
    pub async fn delete(&self, conn: &dyn Executor) -> OrmResult<u64> {
        let built = self.compile(Action::Delete, None)?;
        let outcome = self.run(conn, Statement::Delete(&built.sql, &built.params)).await?;
        Ok(outcome.into_count())
    }

    /// Build `(this select) UNION (other)` without executing it.
    pub fn build_union<'a>(&self, other: impl Into<UnionWith<'a>>) -> OrmResult<Built> {
        let left = self.compile(Action::Select, None)?;
        let right = match other.into() {
            UnionWith::Builder(qb) => qb.build_sql(Action::Union)?,
            UnionWith::Sql { sql, params } => Built { sql, params },
        };
        if placeholder::has_positional(&left.sql) || placeholder::has_positional(&right.sql) {
            return Err(OrmError::build(
                "Positional parameters cannot be used in a UNION query; use named parameters",
            ));
        }
        let mut params = left.params;
        for (key, value) in right.params {
            if params.get(&key).is_some_and(|existing| *existing != value) {
                return Err(OrmError::build(format!(
                    "Parameter {key} is bound to different values on both sides of the UNION"
                )));
            }
            params.insert(&key, value);
        }
        Ok(Built {
            sql: format!("({}) UNION ({})", left.sql, right.sql),
            params,
        })
    }

    /// Execute `(this select) UNION (other)` and return the rows.
    pub async fn union<'a>(
        &self,
        conn: &dyn Executor,
        other: impl Into<UnionWith<'a>>,
    ) -> OrmResult<Vec<Row>> {
        let built = self.build_union(other)?;
        let outcome = self.run(conn, Statement::Select(&built.sql, &built.params)).await?;
        Ok(outcome.into_rows())
    }
}
