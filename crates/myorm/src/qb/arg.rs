//! Values accepted by `data()` and list-style where conditions.

use crate::error::{OrmError, OrmResult};
use crate::qb::expr::Expr;
use crate::value::Value;

/// A column value handed to the builder.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// Scalar, bound as a parameter.
    Value(Value),
    /// Trusted fragment, spliced into the statement.
    Expr(Expr),
    /// JSON document, bound as JSON text.
    Json(serde_json::Value),
    /// JSON sub-path map (`"a.b" => 1`): a `JSON_SET` patch in updates and a
    /// `col->'$.a.b'` comparison in where lists.
    Paths(Vec<(String, Arg)>),
}

impl Arg {
    pub fn paths<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Arg>,
    {
        Arg::Paths(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Value as a JSON node, for documents assembled from a path map.
    pub(crate) fn to_json(&self) -> OrmResult<serde_json::Value> {
        match self {
            Arg::Value(v) => Ok(v.to_json()),
            Arg::Json(j) => Ok(j.clone()),
            Arg::Paths(entries) => {
                let mut map = serde_json::Map::new();
                for (key, arg) in entries {
                    map.insert(key.clone(), arg.to_json()?);
                }
                Ok(serde_json::Value::Object(map))
            }
            Arg::Expr(e) => Err(OrmError::build(format!(
                "SQL fragment `{e}` cannot be embedded in a JSON document"
            ))),
        }
    }

    /// Value to bind: scalars as-is, documents as JSON text.
    pub(crate) fn to_bound(&self) -> OrmResult<Value> {
        match self {
            Arg::Value(v) => Ok(v.clone()),
            Arg::Json(_) | Arg::Paths(_) => Ok(Value::Str(serde_json::to_string(&self.to_json()?)?)),
            Arg::Expr(e) => Err(OrmError::build(format!(
                "SQL fragment `{e}` cannot be bound as a parameter"
            ))),
        }
    }
}

impl From<Expr> for Arg {
    fn from(e: Expr) -> Self {
        Arg::Expr(e)
    }
}

impl From<serde_json::Value> for Arg {
    fn from(j: serde_json::Value) -> Self {
        Arg::Json(j)
    }
}

impl From<Value> for Arg {
    fn from(v: Value) -> Self {
        Arg::Value(v)
    }
}

macro_rules! impl_arg_from_value {
    ($($t:ty),*) => {
        $(impl From<$t> for Arg {
            fn from(v: $t) -> Self {
                Arg::Value(Value::from(v))
            }
        })*
    };
}

impl_arg_from_value!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, bool, &str, String, &String);

impl<T: Into<Value>> From<Option<T>> for Arg {
    fn from(v: Option<T>) -> Self {
        Arg::Value(v.into())
    }
}
