//! Composable SQL fragments.
//!
//! [`Expr`] is a closed set of trusted SQL fragments: raw text, AND/OR groups,
//! IN lists, BETWEEN ranges and `JSON_REMOVE` calls. Rendering is a pure
//! function of the variant and its parts; nothing is parameter-bound.
//!
//! When an AND/OR group appears inside another expression it is wrapped in
//! parentheses, so `and(or(1, 2), 3)` renders `(1 OR 2) AND 3`.

use crate::ident::{is_json_document, json_path, quote_literal, quote_target};
use crate::value::Value;
use std::fmt;

/// One operand of an [`Expr`]: a literal rendered verbatim or a nested expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Lit(String),
    Expr(Expr),
}

impl Part {
    /// A single-quoted string literal (`'O\'Brien'`).
    pub fn quoted(s: &str) -> Self {
        Part::Lit(quote_literal(s))
    }

    fn render_into(&self, out: &mut String) {
        match self {
            Part::Lit(s) => out.push_str(s),
            Part::Expr(e @ (Expr::And(_) | Expr::Or(_))) => {
                out.push('(');
                e.render_into(out);
                out.push(')');
            }
            Part::Expr(e) => e.render_into(out),
        }
    }
}

impl From<Expr> for Part {
    fn from(e: Expr) -> Self {
        Part::Expr(e)
    }
}

impl From<&str> for Part {
    fn from(s: &str) -> Self {
        Part::Lit(s.to_string())
    }
}

impl From<String> for Part {
    fn from(s: String) -> Self {
        Part::Lit(s)
    }
}

impl From<Value> for Part {
    fn from(v: Value) -> Self {
        Part::Lit(v.to_string())
    }
}

macro_rules! impl_part_from_scalar {
    ($($t:ty),*) => {
        $(impl From<$t> for Part {
            fn from(v: $t) -> Self {
                Part::Lit(Value::from(v).to_string())
            }
        })*
    };
}

impl_part_from_scalar!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, bool);

/// A trusted SQL fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Parts joined by a single space.
    Raw(Vec<Part>),
    /// Parts joined by `AND`.
    And(Vec<Part>),
    /// Parts joined by `OR`.
    Or(Vec<Part>),
    /// `IN (a, b, ...)`.
    In(Vec<Part>),
    /// `BETWEEN lo AND hi`.
    Between(Box<Part>, Box<Part>),
    /// `JSON_REMOVE(doc, 'path', ...)`; `doc` is a column name or a JSON document.
    JsonRemove { doc: String, paths: Vec<String> },
}

fn collect<I, P>(parts: I) -> Vec<Part>
where
    I: IntoIterator<Item = P>,
    P: Into<Part>,
{
    parts.into_iter().map(Into::into).collect()
}

impl Expr {
    pub fn raw<I, P>(parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Part>,
    {
        Expr::Raw(collect(parts))
    }

    pub fn and<I, P>(parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Part>,
    {
        Expr::And(collect(parts))
    }

    pub fn or<I, P>(parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Part>,
    {
        Expr::Or(collect(parts))
    }

    pub fn in_list<I, P>(parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Part>,
    {
        Expr::In(collect(parts))
    }

    pub fn between(lo: impl Into<Part>, hi: impl Into<Part>) -> Self {
        Expr::Between(Box::new(lo.into()), Box::new(hi.into()))
    }

    pub fn json_remove<I, S>(doc: impl Into<String>, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Expr::JsonRemove {
            doc: doc.into(),
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Return a copy with one more operand appended.
    ///
    /// For `JsonRemove` the operand is taken as another path. `Between` has a
    /// fixed arity: the operand replaces the upper bound.
    pub fn add(self, part: impl Into<Part>) -> Self {
        let part = part.into();
        match self {
            Expr::Raw(mut parts) => {
                parts.push(part);
                Expr::Raw(parts)
            }
            Expr::And(mut parts) => {
                parts.push(part);
                Expr::And(parts)
            }
            Expr::Or(mut parts) => {
                parts.push(part);
                Expr::Or(parts)
            }
            Expr::In(mut parts) => {
                parts.push(part);
                Expr::In(parts)
            }
            Expr::Between(lo, _) => Expr::Between(lo, Box::new(part)),
            Expr::JsonRemove { doc, mut paths } => {
                let mut path = String::new();
                part.render_into(&mut path);
                paths.push(path);
                Expr::JsonRemove { doc, paths }
            }
        }
    }

    /// Render the fragment as SQL text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    pub(crate) fn render_into(&self, out: &mut String) {
        match self {
            Expr::Raw(parts) => join_parts(out, parts, " "),
            Expr::And(parts) => join_parts(out, parts, " AND "),
            Expr::Or(parts) => join_parts(out, parts, " OR "),
            Expr::In(parts) => {
                out.push_str("IN (");
                join_parts(out, parts, ", ");
                out.push(')');
            }
            Expr::Between(lo, hi) => {
                out.push_str("BETWEEN ");
                lo.render_into(out);
                out.push_str(" AND ");
                hi.render_into(out);
            }
            Expr::JsonRemove { doc, paths } => {
                out.push_str("JSON_REMOVE(");
                if is_json_document(doc) {
                    out.push_str(&quote_literal(doc));
                } else {
                    out.push_str(&quote_target(doc));
                }
                for path in paths {
                    out.push_str(", '");
                    out.push_str(&json_path(path));
                    out.push('\'');
                }
                out.push(')');
            }
        }
    }
}

fn join_parts(out: &mut String, parts: &[Part], sep: &str) {
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push_str(sep);
        }
        part.render_into(out);
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_joins_with_space() {
        assert_eq!(Expr::raw(["IS", "NOT", "NULL"]).render(), "IS NOT NULL");
        assert_eq!(Expr::raw(["> 5"]).add("AND age < 9").render(), "> 5 AND age < 9");
    }

    #[test]
    fn nested_groups_are_parenthesized() {
        let e = Expr::and([Part::from(Expr::or([1, 2])), Part::from(3)]);
        assert_eq!(e.render(), "(1 OR 2) AND 3");

        let e = Expr::or([Part::from(Expr::and(["a = 1", "b = 2"])), Part::from("c = 3")]);
        assert_eq!(e.render(), "(a = 1 AND b = 2) OR c = 3");
    }

    #[test]
    fn non_group_children_are_not_parenthesized() {
        let e = Expr::and([Part::from(Expr::raw(["x", "IS NULL"])), Part::from("y = 1")]);
        assert_eq!(e.render(), "x IS NULL AND y = 1");
    }

    #[test]
    fn in_and_between() {
        assert_eq!(Expr::in_list([1, 2, 3]).render(), "IN (1, 2, 3)");
        assert_eq!(
            Expr::in_list([Part::quoted("a"), Part::quoted("b")]).render(),
            "IN ('a', 'b')"
        );
        assert_eq!(Expr::between(10, 20).render(), "BETWEEN 10 AND 20");
        assert_eq!(Expr::between(10, 20).add(30).render(), "BETWEEN 10 AND 30");
    }

    #[test]
    fn json_remove_on_column() {
        let e = Expr::json_remove("json_column", ["e.0.ea"]);
        assert_eq!(e.render(), "JSON_REMOVE(`json_column`, '$.e[0].ea')");
        let e = e.add("a.b");
        assert_eq!(
            e.render(),
            "JSON_REMOVE(`json_column`, '$.e[0].ea', '$.a.b')"
        );
    }

    #[test]
    fn json_remove_on_document() {
        let e = Expr::json_remove(r#"{"a":1,"b":2}"#, ["a"]);
        assert_eq!(e.render(), r#"JSON_REMOVE('{"a":1,"b":2}', '$.a')"#);
    }

    #[test]
    fn render_is_deterministic() {
        let e = Expr::and([Part::from(Expr::or(["a", "b"])), Part::from(Expr::in_list([1]))]);
        assert_eq!(e.render(), e.render());
        assert_eq!(e.to_string(), "(a OR b) AND IN (1)");
    }
}
