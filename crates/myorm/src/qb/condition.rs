//! Where-clause normalization.
//!
//! Every accepted where shape is turned into a [`Condition`]: a SQL fragment
//! plus the parameters it binds. List conditions produce `column = :column`
//! comparisons; nested path maps compare JSON sub-paths
//! (`` `col`->'$.a.b' = :col_a_b ``). SQL fragments passed as parameters are
//! substituted at their placeholder and never bound.

use crate::error::{OrmError, OrmResult};
use crate::ident::{json_path, quote_target};
use crate::placeholder::{self, Kind};
use crate::qb::arg::Arg;
use crate::qb::expr::Expr;
use crate::value::{Params, param_key};

/// Join keyword for list conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Join {
    #[default]
    And,
    Or,
}

impl Join {
    fn separator(self) -> &'static str {
        match self {
            Join::And => " AND ",
            Join::Or => " OR ",
        }
    }

    /// Parse `"and"` / `"or"` (any case).
    pub fn parse(s: &str) -> OrmResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "and" => Ok(Join::And),
            "or" => Ok(Join::Or),
            other => Err(OrmError::normalization(format!(
                "Unknown join type '{other}', expected 'and' or 'or'"
            ))),
        }
    }
}

/// A where input in one of its accepted shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Where {
    /// SQL with `:name` or `?` placeholders and their values.
    Sql { sql: String, params: Vec<(String, Arg)> },
    /// `column → value` pairs joined by AND/OR.
    List { join: Join, pairs: Vec<(String, Arg)> },
    /// A rendered fragment plus optional placeholder values.
    Expr { expr: Expr, params: Vec<(String, Arg)> },
}

fn pairs_of<I, K, V>(pairs: I) -> Vec<(String, Arg)>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Arg>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

impl Where {
    pub fn sql(sql: impl Into<String>) -> Self {
        Where::Sql {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn expr(expr: Expr) -> Self {
        Where::Expr {
            expr,
            params: Vec::new(),
        }
    }

    pub fn and<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Arg>,
    {
        Where::list(Join::And, pairs)
    }

    pub fn or<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Arg>,
    {
        Where::list(Join::Or, pairs)
    }

    pub fn list<I, K, V>(join: Join, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Arg>,
    {
        Where::List {
            join,
            pairs: pairs_of(pairs),
        }
    }

    /// Bind a value to a `:name` placeholder. Ignored for list conditions.
    pub fn bind(mut self, name: &str, value: impl Into<Arg>) -> Self {
        if let Where::Sql { params, .. } | Where::Expr { params, .. } = &mut self {
            params.push((param_key(name), value.into()));
        }
        self
    }

    /// Bind the next `?` placeholder. Ignored for list conditions.
    pub fn push(mut self, value: impl Into<Arg>) -> Self {
        if let Where::Sql { params, .. } | Where::Expr { params, .. } = &mut self {
            let next = params.iter().filter(|(k, _)| !k.starts_with(':')).count() + 1;
            params.push((next.to_string(), value.into()));
        }
        self
    }
}

impl From<Expr> for Where {
    fn from(expr: Expr) -> Self {
        Where::expr(expr)
    }
}

impl From<&str> for Where {
    fn from(sql: &str) -> Self {
        Where::sql(sql)
    }
}

impl From<String> for Where {
    fn from(sql: String) -> Self {
        Where::sql(sql)
    }
}

/// A normalized where clause.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Condition {
    pub fragment: String,
    pub params: Params,
}

impl Condition {
    pub fn is_empty(&self) -> bool {
        self.fragment.trim().is_empty()
    }
}

/// Normalize a where input into a fragment and its bound parameters.
pub fn normalize(input: &Where) -> OrmResult<Condition> {
    match input {
        Where::List { join, pairs } => normalize_list(*join, pairs),
        Where::Sql { sql, params } => normalize_sql(sql, params),
        Where::Expr { expr, params } => normalize_sql(&expr.render(), params),
    }
}

/// Placeholder name derived from a column or path: every character outside
/// `[A-Za-z0-9_]` becomes `_`.
pub(crate) fn bind_name(raw: &str) -> String {
    raw.chars()
        .map(|c| if c == '_' || c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// `base`, or `base_2`, `base_3`, ... when an earlier binding took the name.
pub(crate) fn unique_key(params: &Params, base: String) -> String {
    if !params.contains(&base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}_{n}");
        if !params.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn normalize_list(join: Join, pairs: &[(String, Arg)]) -> OrmResult<Condition> {
    let mut fragments = Vec::with_capacity(pairs.len());
    let mut params = Params::new();

    for (column, value) in pairs {
        match value {
            Arg::Paths(entries) => {
                for (path, json_value) in entries {
                    let target = format!("{}->'{}'", quote_target(column), json_path(path));
                    match json_value {
                        Arg::Expr(e) => fragments.push(format!("{target} {e}")),
                        Arg::Value(v) => {
                            let key =
                                unique_key(&params, format!(":{}", bind_name(&format!("{column}.{path}"))));
                            fragments.push(format!("{target} = {key}"));
                            params.insert(&key, v.clone());
                        }
                        Arg::Json(_) | Arg::Paths(_) => {
                            return Err(OrmError::normalization(format!(
                                "JSON condition on '{column}' at '{path}' must be a scalar or SQL fragment"
                            )));
                        }
                    }
                }
            }
            Arg::Expr(e) => fragments.push(format!("{column} {e}")),
            Arg::Value(v) => {
                let key = unique_key(&params, format!(":{}", bind_name(column)));
                fragments.push(format!("{column} = {key}"));
                params.insert(&key, v.clone());
            }
            Arg::Json(_) => {
                return Err(OrmError::normalization(format!(
                    "Condition on '{column}' must be a scalar, SQL fragment or path map"
                )));
            }
        }
    }

    Ok(Condition {
        fragment: fragments.join(join.separator()),
        params,
    })
}

fn normalize_sql(sql: &str, raw_params: &[(String, Arg)]) -> OrmResult<Condition> {
    let lookup = |key: &str| raw_params.iter().rev().find(|(k, _)| k == key).map(|(_, a)| a);

    let mut params = Params::new();
    let mut position = 0;
    let mut bound_positional = 0;
    let fragment = placeholder::rewrite(sql, |ph| {
        let key = match &ph.kind {
            Kind::Named(name) => name.clone(),
            Kind::Positional => {
                position += 1;
                position.to_string()
            }
        };
        let arg = lookup(&key);
        if let Some(Arg::Expr(e)) = arg {
            return Ok(Some(e.render()));
        }
        // Inlined fragments shift the positions of the `?` markers after them.
        let bound_key = match ph.kind {
            Kind::Named(_) => key.clone(),
            Kind::Positional => {
                bound_positional += 1;
                bound_positional.to_string()
            }
        };
        match arg {
            Some(Arg::Paths(_)) => Err(OrmError::normalization(format!(
                "Parameter {key} cannot be a path map"
            ))),
            Some(arg) => {
                params.insert(&bound_key, arg.to_bound()?);
                Ok(None)
            }
            None => Err(OrmError::normalization(match ph.kind {
                Kind::Named(_) => format!("Missing value for parameter {key}"),
                Kind::Positional => format!("Missing value for positional parameter {key}"),
            })),
        }
    })?;

    Ok(Condition { fragment, params })
}
