//! Scalar values bound to statements and read back from rows.

use crate::ident::quote_literal;
use std::collections::BTreeMap;
use std::fmt;

/// A scalar SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Binding tag used by executors when handing a [`Value`] to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Null,
    Bool,
    Int,
    Str,
}

impl Value {
    /// The binding tag for this value. Floats are bound as their decimal text.
    pub fn param_type(&self) -> ParamType {
        match self {
            Value::Null => ParamType::Null,
            Value::Bool(_) => ParamType::Bool,
            Value::Int(_) => ParamType::Int,
            Value::Float(_) | Value::Str(_) => ParamType::Str,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for values treated as "not provided" when checking key presence:
    /// NULL, `false`, `0`, `0.0`, `""` and `"0"`.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !b,
            Value::Int(i) => *i == 0,
            Value::Float(f) => *f == 0.0,
            Value::Str(s) => s.is_empty() || s == "0",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Str(s) => s.trim().parse().ok(),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Render as a SQL literal for readable statement logging.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Str(s) => quote_literal(s),
            other => other.to_string(),
        }
    }

    /// Convert to a JSON value (strings stay strings).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(true) => f.write_str("TRUE"),
            Value::Bool(false) => f.write_str("FALSE"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => f.write_str(s),
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(i64::from(v))
            }
        })*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(i) => Value::Int(i),
            Err(_) => Value::Str(v.to_string()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Str(v.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Named and positional statement parameters.
///
/// Named keys are stored with their leading `:` (`":height"`); positional
/// parameters use their 1-based index as key (`"1"`, `"2"`, ...).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(BTreeMap<String, Value>);

/// Shared empty parameter set for statements that bind nothing.
pub(crate) static NO_PARAMS: Params = Params(BTreeMap::new());

pub(crate) fn param_key(name: &str) -> String {
    if name.starts_with(':') || (!name.is_empty() && name.bytes().all(|b| b.is_ascii_digit())) {
        name.to_string()
    } else {
        format!(":{name}")
    }
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chainable [`Params::insert`].
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Bind a named parameter; the leading `:` is optional.
    pub fn insert(&mut self, name: &str, value: impl Into<Value>) {
        self.0.insert(param_key(name), value.into());
    }

    /// Append a positional (`?`) parameter.
    pub fn push(&mut self, value: impl Into<Value>) {
        let next = self.positional_len() + 1;
        self.0.insert(next.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(&param_key(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&param_key(name))
    }

    /// The value bound to the `n`-th (1-based) positional placeholder.
    pub fn positional(&self, n: usize) -> Option<&Value> {
        self.0.get(&n.to_string())
    }

    pub fn positional_len(&self) -> usize {
        self.0.keys().filter(|k| !k.starts_with(':')).count()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Merge `other` into `self`; keys from `other` win.
    pub fn extend(&mut self, other: Params) {
        self.0.extend(other.0);
    }
}

impl<K: AsRef<str>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.insert(k.as_ref(), v);
        }
        params
    }
}

impl IntoIterator for Params {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_types_follow_binding_tags() {
        assert_eq!(Value::Null.param_type(), ParamType::Null);
        assert_eq!(Value::Bool(true).param_type(), ParamType::Bool);
        assert_eq!(Value::Int(3).param_type(), ParamType::Int);
        assert_eq!(Value::Float(1.5).param_type(), ParamType::Str);
        assert_eq!(Value::from("x").param_type(), ParamType::Str);
    }

    #[test]
    fn display_uses_sql_keywords() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Bool(false).to_string(), "FALSE");
        assert_eq!(Value::from(170).to_string(), "170");
        assert_eq!(Value::from("it's").to_sql_literal(), "'it\\'s'");
    }

    #[test]
    fn blank_values() {
        assert!(Value::from("").is_blank());
        assert!(Value::from("0").is_blank());
        assert!(Value::from(0).is_blank());
        assert!(!Value::from(7).is_blank());
        assert!(!Value::from("a").is_blank());
    }

    #[test]
    fn params_normalize_names() {
        let params = Params::new().with("height", 170).with(":name", "Bob");
        assert_eq!(params.get(":height"), Some(&Value::Int(170)));
        assert_eq!(params.get("name"), Some(&Value::from("Bob")));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn positional_params_are_one_based() {
        let mut params = Params::new();
        params.push(1);
        params.push("two");
        params.insert("named", 3);
        assert_eq!(params.positional(1), Some(&Value::Int(1)));
        assert_eq!(params.positional(2), Some(&Value::from("two")));
        assert_eq!(params.positional_len(), 2);
    }

    #[test]
    fn large_unsigned_falls_back_to_text() {
        assert_eq!(Value::from(u64::MAX), Value::Str(u64::MAX.to_string()));
    }
}
