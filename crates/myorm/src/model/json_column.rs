use crate::error::{OrmError, OrmResult};
use crate::qb::Arg;
use crate::value::Value;
use serde_json::map::Entry;
use serde_json::{Map, Value as Json};

/// A JSON column value that remembers which paths were altered.
///
/// Saving a model whose primary key is filled turns recorded alterations into
/// a `JSON_SET` patch; otherwise the whole document is written.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JsonColumn {
    doc: Json,
    patch: Vec<(String, Json)>,
}

impl JsonColumn {
    pub fn new(doc: Json) -> Self {
        Self {
            doc,
            patch: Vec::new(),
        }
    }

    /// Parse JSON text; only objects and arrays are accepted.
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str::<Json>(text) {
            Ok(doc @ (Json::Object(_) | Json::Array(_))) => Some(Self::new(doc)),
            _ => None,
        }
    }

    pub fn document(&self) -> &Json {
        &self.doc
    }

    /// Value at a dotted path (`"e.0.ea"`).
    pub fn get(&self, path: &str) -> Option<&Json> {
        path.split('.').try_fold(&self.doc, |node, segment| match node {
            Json::Object(map) => map.get(segment),
            Json::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// Set the value at a dotted path and record the change for a partial
    /// update.
    ///
    /// Missing object keys are created; the patch then sets the first missing
    /// key to the built subtree. An array index equal to the length appends.
    /// A non-numeric key into an array, an index past the end, or a path
    /// through a scalar is an error and leaves the column untouched.
    pub fn alter(&mut self, path: &str, value: impl Into<Json>) -> OrmResult<&mut Self> {
        let value = value.into();
        if self.doc.is_null() {
            self.doc = Json::Object(Map::new());
        }
        let segments: Vec<&str> = path.split('.').collect();
        let depth = set_path(&mut self.doc, &segments, value)?;
        let recorded = segments[..depth].join(".");
        let recorded_value = self.get(&recorded).cloned().unwrap_or_default();
        let nested = format!("{recorded}.");
        self.patch
            .retain(|(p, _)| *p != recorded && !p.starts_with(&nested));
        self.patch.push((recorded, recorded_value));
        Ok(self)
    }

    /// Replace one top-level key, or array index (the length appends). The
    /// document is written whole on the next save, so recorded alterations
    /// are dropped.
    pub fn set(&mut self, key: &str, value: impl Into<Json>) -> OrmResult<&mut Self> {
        if self.doc.is_null() {
            self.doc = Json::Object(Map::new());
        }
        set_path(&mut self.doc, &[key], value.into())?;
        self.patch.clear();
        Ok(self)
    }

    /// Replace the whole document. Recorded alterations are dropped.
    pub fn replace(&mut self, doc: Json) {
        self.doc = doc;
        self.patch.clear();
    }

    pub fn patch(&self) -> &[(String, Json)] {
        &self.patch
    }

    pub fn is_patched(&self) -> bool {
        !self.patch.is_empty()
    }

    pub(crate) fn clear_patch(&mut self) {
        self.patch.clear();
    }

    pub fn to_json_string(&self) -> String {
        self.doc.to_string()
    }

    /// Save argument: the recorded patch as a path map when `partial` is set
    /// and something was altered, the full document text otherwise.
    pub(crate) fn to_arg(&self, partial: bool) -> Arg {
        if partial && self.is_patched() {
            Arg::Paths(
                self.patch
                    .iter()
                    .map(|(path, value)| (path.clone(), json_arg(value)))
                    .collect(),
            )
        } else {
            Arg::Value(Value::Str(self.to_json_string()))
        }
    }
}

fn json_arg(value: &Json) -> Arg {
    match value {
        Json::Null => Arg::Value(Value::Null),
        Json::Bool(b) => Arg::Value(Value::Bool(*b)),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Arg::Value(Value::Int(i)),
            None => Arg::Value(Value::Float(n.as_f64().unwrap_or_default())),
        },
        Json::String(s) => Arg::Value(Value::Str(s.clone())),
        doc => Arg::Json(doc.clone()),
    }
}

/// Write `value` at `segments`. Returns how many segments address the
/// change as MySQL's `JSON_SET` would apply it.
fn set_path(node: &mut Json, segments: &[&str], value: Json) -> OrmResult<usize> {
    let path = segments.join(".");
    let mut target = node;
    for (depth, segment) in segments.iter().enumerate() {
        let rest = &segments[depth + 1..];
        target = match target {
            Json::Object(map) => match map.entry(segment.to_string()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    entry.insert(nest(rest, value));
                    return Ok(depth + 1);
                }
            },
            Json::Array(items) => {
                let Ok(index) = segment.parse::<usize>() else {
                    return Err(OrmError::validation(format!(
                        "JSON path '{path}': '{segment}' is not an index into an array"
                    )));
                };
                if index == items.len() {
                    items.push(nest(rest, value));
                    return Ok(depth + 1);
                }
                let len = items.len();
                items.get_mut(index).ok_or_else(|| {
                    OrmError::validation(format!(
                        "JSON path '{path}': index {index} is past the end of an array of {len}"
                    ))
                })?
            }
            _ => {
                let at = match depth {
                    0 => "the document".to_string(),
                    _ => format!("'{}'", segments[..depth].join(".")),
                };
                return Err(OrmError::validation(format!(
                    "JSON path '{path}': {at} is not an object or array"
                )));
            }
        };
    }
    *target = value;
    Ok(segments.len())
}

/// `value` wrapped in one object per remaining segment.
fn nest(segments: &[&str], value: Json) -> Json {
    segments.iter().rev().fold(value, |inner, segment| {
        let mut map = Map::new();
        map.insert(segment.to_string(), inner);
        Json::Object(map)
    })
}
