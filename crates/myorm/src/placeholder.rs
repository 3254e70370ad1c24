//! Placeholder scanning for `:name` and `?` markers.
//!
//! The scanner skips string literals (`'..'`, `".."`), quoted identifiers
//! (`` `..` ``) and comments, so `'12:30'`, `` `a:b` `` and `-- :x` never count
//! as placeholders. `::` is not a placeholder either.

use crate::error::{OrmError, OrmResult};
use crate::value::{Params, Value};
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Kind {
    /// `:name`, stored with the leading colon.
    Named(String),
    /// `?`
    Positional,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Placeholder {
    pub range: Range<usize>,
    pub kind: Kind,
}

fn is_name_byte(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphanumeric()
}

/// Find every placeholder in `sql`, in order of appearance.
pub(crate) fn scan(sql: &str) -> Vec<Placeholder> {
    let bytes = sql.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => {
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == b'\\' && quote != b'`' {
                        i += 2;
                        continue;
                    }
                    if bytes[i] == quote {
                        // Doubled quote is an escaped quote.
                        if bytes.get(i + 1) == Some(&quote) {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i += 1;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = skip_line(bytes, i);
            }
            b'#' => {
                i = skip_line(bytes, i);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = match sql[i + 2..].find("*/") {
                    Some(pos) => i + 2 + pos + 2,
                    None => bytes.len(),
                };
            }
            b':' if bytes.get(i + 1) == Some(&b':') => {
                i += 2;
            }
            b':' if bytes.get(i + 1).copied().is_some_and(is_name_byte) => {
                let start = i;
                i += 1;
                while i < bytes.len() && is_name_byte(bytes[i]) {
                    i += 1;
                }
                out.push(Placeholder {
                    range: start..i,
                    kind: Kind::Named(sql[start..i].to_string()),
                });
            }
            b'?' => {
                out.push(Placeholder {
                    range: i..i + 1,
                    kind: Kind::Positional,
                });
                i += 1;
            }
            _ => i += 1,
        }
    }
    out
}

fn skip_line(bytes: &[u8], from: usize) -> usize {
    let mut i = from;
    while i < bytes.len() && bytes[i] != b'\n' {
        i += 1;
    }
    i
}

/// Rebuild `sql`, replacing each placeholder for which `replace` returns `Some`.
pub(crate) fn rewrite<F>(sql: &str, mut replace: F) -> OrmResult<String>
where
    F: FnMut(&Placeholder) -> OrmResult<Option<String>>,
{
    let mut out = String::with_capacity(sql.len());
    let mut last = 0;
    for ph in scan(sql) {
        if let Some(replacement) = replace(&ph)? {
            out.push_str(&sql[last..ph.range.start]);
            out.push_str(&replacement);
            last = ph.range.end;
        }
    }
    out.push_str(&sql[last..]);
    Ok(out)
}

/// Named placeholders in order of appearance.
pub(crate) fn named(sql: &str) -> Vec<String> {
    scan(sql)
        .into_iter()
        .filter_map(|ph| match ph.kind {
            Kind::Named(name) => Some(name),
            Kind::Positional => None,
        })
        .collect()
}

pub(crate) fn has_positional(sql: &str) -> bool {
    scan(sql).iter().any(|ph| ph.kind == Kind::Positional)
}

/// Rewrite named and positional placeholders to `?` and collect the values in
/// binding order. A placeholder without a value is an error.
pub(crate) fn to_positional(sql: &str, params: &Params) -> OrmResult<(String, Vec<Value>)> {
    let mut values = Vec::new();
    let mut position = 0;
    let sql = rewrite(sql, |ph| {
        let value = match &ph.kind {
            Kind::Named(name) => params
                .get(name)
                .ok_or_else(|| OrmError::build(format!("Missing value for parameter {name}")))?,
            Kind::Positional => {
                position += 1;
                params.positional(position).ok_or_else(|| {
                    OrmError::build(format!("Missing value for positional parameter {position}"))
                })?
            }
        };
        values.push(value.clone());
        Ok(Some("?".to_string()))
    })?;
    Ok((sql, values))
}

/// Substitute every placeholder with its value as a SQL literal. Used for
/// logging only; unknown placeholders are left in place.
pub(crate) fn interpolate(sql: &str, params: &Params) -> String {
    let mut position = 0;
    let rendered = rewrite(sql, |ph| {
        let value = match &ph.kind {
            Kind::Named(name) => params.get(name),
            Kind::Positional => {
                position += 1;
                params.positional(position)
            }
        };
        Ok(value.map(Value::to_sql_literal))
    });
    rendered.unwrap_or_else(|_| sql.to_string())
}
