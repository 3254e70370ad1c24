//! Identifier, JSON path and literal helpers for MySQL.
//!
//! [`Ident`] parses dotted identifiers such as `app.users` or
//! `` `my db`.`user table` `` and always renders every part backtick-quoted.
//!
//! - Unquoted parts are validated against `[A-Za-z0-9_$]+` and may not be all digits
//! - Backtick-quoted parts allow any characters except NUL and escape `` ` `` as ``` `` ```
//!
//! [`quote_target`] and [`json_path`] are the lenient helpers the builder uses for
//! field, table and JSON path rendering.
//!
//! # Example
//! ```
//! use myorm::{Ident, json_path, quote_target};
//!
//! assert_eq!(Ident::parse("app.users")?.to_sql(), "`app`.`users`");
//! assert_eq!(quote_target("first_name"), "`first_name`");
//! assert_eq!(json_path("d.db.1"), "$.d.db[1]");
//! # Ok::<(), myorm::OrmError>(())
//! ```

use crate::error::{OrmError, OrmResult};

/// A part of a SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentPart {
    /// Unquoted identifier: must match `[A-Za-z0-9_$]+` and contain a non-digit.
    Unquoted(String),
    /// Backtick-quoted identifier: allows any characters except NUL.
    Quoted(String),
}

impl IdentPart {
    pub fn name(&self) -> &str {
        match self {
            IdentPart::Unquoted(s) | IdentPart::Quoted(s) => s,
        }
    }
}

/// A SQL identifier (database, table, or column name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub parts: Vec<IdentPart>,
}

impl Ident {
    /// Create a single-part quoted identifier from a raw name.
    pub fn quoted(name: &str) -> OrmResult<Self> {
        if name.is_empty() {
            return Err(OrmError::validation("Empty quoted identifier"));
        }
        if name.contains('\0') {
            return Err(OrmError::validation(
                "Identifier cannot contain NUL character",
            ));
        }
        Ok(Self {
            parts: vec![IdentPart::Quoted(name.to_string())],
        })
    }

    /// Parse an identifier string, supporting dotted and backtick-quoted forms.
    pub fn parse(s: &str) -> OrmResult<Self> {
        if s.is_empty() {
            return Err(OrmError::validation("Identifier cannot be empty"));
        }
        if s.contains('\0') {
            return Err(OrmError::validation(
                "Identifier cannot contain NUL character",
            ));
        }

        let mut parts = Vec::new();
        let mut chars = s.chars().peekable();

        while chars.peek().is_some() {
            if !parts.is_empty() {
                match chars.next() {
                    Some('.') => {
                        if chars.peek().is_none() {
                            return Err(OrmError::validation("Trailing '.' in identifier"));
                        }
                    }
                    Some(c) => {
                        return Err(OrmError::validation(format!(
                            "Expected '.' between identifier parts, got '{c}'"
                        )));
                    }
                    None => break,
                }
            }

            if chars.peek() == Some(&'`') {
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('`') => {
                            if chars.peek() == Some(&'`') {
                                chars.next();
                                name.push('`');
                            } else {
                                break;
                            }
                        }
                        Some(c) => name.push(c),
                        None => return Err(OrmError::validation("Unclosed quoted identifier")),
                    }
                }
                if name.is_empty() {
                    return Err(OrmError::validation("Empty quoted identifier"));
                }
                parts.push(IdentPart::Quoted(name));
                continue;
            }

            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if c == '.' {
                    break;
                }
                if c == '_' || c == '$' || c.is_ascii_alphanumeric() {
                    name.push(c);
                    chars.next();
                } else {
                    return Err(OrmError::validation(format!(
                        "Invalid character in identifier: '{c}'"
                    )));
                }
            }
            if name.is_empty() {
                return Err(OrmError::validation("Empty identifier segment"));
            }
            if name.bytes().all(|b| b.is_ascii_digit()) {
                return Err(OrmError::validation(format!(
                    "Identifier segment cannot be all digits: '{name}'"
                )));
            }
            parts.push(IdentPart::Unquoted(name));
        }

        if parts.is_empty() {
            return Err(OrmError::validation("Empty identifier"));
        }

        Ok(Self { parts })
    }

    /// Render the identifier as SQL, every part backtick-quoted.
    pub fn to_sql(&self) -> String {
        let mut out = String::new();
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            push_quoted(&mut out, part.name());
        }
        out
    }
}

fn push_quoted(out: &mut String, name: &str) {
    out.push('`');
    for ch in name.chars() {
        if ch == '`' {
            out.push('`');
        }
        out.push(ch);
    }
    out.push('`');
}

/// Quote a field or table name unless it already looks like an expression.
///
/// Names containing a space, `,`, `.`, a backtick or `->` are passed through
/// untouched (`COUNT(1) AS cnt`, `u.id`, `` `col`->>'$.a' ``); anything else
/// is wrapped in backticks.
pub fn quote_target(target: &str) -> String {
    let passthrough = target.contains(' ')
        || target.contains(',')
        || target.contains('.')
        || target.contains('`')
        || target.contains("->");
    if passthrough {
        target.to_string()
    } else {
        format!("`{target}`")
    }
}

/// Convert a dotted accessor into a MySQL JSON path: `a.b.0` → `$.a.b[0]`.
pub fn json_path(path: &str) -> String {
    let mut out = String::from("$");
    for segment in path.split('.') {
        if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
            out.push('[');
            out.push_str(segment);
            out.push(']');
        } else {
            out.push('.');
            out.push_str(segment);
        }
    }
    out
}

/// Quote a string as a single-quoted SQL literal.
pub fn quote_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(ch),
        }
    }
    out.push('\'');
    out
}

/// True when `s` parses as a JSON object or array.
pub fn is_json_document(s: &str) -> bool {
    let trimmed = s.trim_start();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return false;
    }
    matches!(
        serde_json::from_str::<serde_json::Value>(s),
        Ok(serde_json::Value::Object(_) | serde_json::Value::Array(_))
    )
}
