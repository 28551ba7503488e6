//! Form payload values.
//!
//! Payloads are trees of [`FormValue`]. Unlike `serde_json::Value`, a
//! payload may carry file attachments; file presence drives content-type
//! selection (multipart vs JSON) and the validator's file-skip rule.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::{Error, Result};

/// A single form payload value.
#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    File(FileMeta),
    List(Vec<FormValue>),
    Map(BTreeMap<String, FormValue>),
}

/// Metadata and content for a file-valued field.
///
/// The crate only detects files; encoding them (multipart assembly) is the
/// transport's concern.
#[derive(Debug, Clone, PartialEq)]
pub struct FileMeta {
    pub filename: String,
    pub content_type: String,
    pub content: Bytes,
}

impl FormValue {
    /// True if this value is, or recursively contains, a file.
    pub fn contains_files(&self) -> bool {
        match self {
            Self::File(_) => true,
            Self::List(items) => items.iter().any(FormValue::contains_files),
            Self::Map(entries) => entries.values().any(FormValue::contains_files),
            _ => false,
        }
    }

    /// Convert to a JSON value. Fails on file values, which cannot be
    /// represented in a JSON body.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        self.to_json_at("")
    }

    fn to_json_at(&self, path: &str) -> Result<serde_json::Value> {
        Ok(match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::File(_) => return Err(Error::FileInPayload(path.to_string())),
            Self::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    out.push(item.to_json_at(&format!("{path}[{i}]"))?);
                }
                serde_json::Value::Array(out)
            }
            Self::Map(entries) => {
                let mut out = serde_json::Map::new();
                for (key, value) in entries {
                    let child = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{path}.{key}")
                    };
                    out.insert(key.clone(), value.to_json_at(&child)?);
                }
                serde_json::Value::Object(out)
            }
        })
    }
}

impl From<&str> for FormValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FormValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for FormValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for FormValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for FormValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<FileMeta> for FormValue {
    fn from(file: FileMeta) -> Self {
        Self::File(file)
    }
}

impl From<Vec<FormValue>> for FormValue {
    fn from(items: Vec<FormValue>) -> Self {
        Self::List(items)
    }
}

/// A named form payload: field name to value.
pub type FormData = BTreeMap<String, FormValue>;

/// Merge two payloads; `overrides` wins on key collision.
pub fn merge(base: FormData, overrides: FormData) -> FormData {
    let mut merged = base;
    merged.extend(overrides);
    merged
}

/// True if any field in the payload contains a file.
pub fn contains_files(data: &FormData) -> bool {
    data.values().any(FormValue::contains_files)
}

/// Convert a payload to a JSON object. Fails on file values.
pub fn to_json(data: &FormData) -> Result<serde_json::Value> {
    let mut out = serde_json::Map::new();
    for (key, value) in data {
        out.insert(key.clone(), value.to_json_at(key)?);
    }
    Ok(serde_json::Value::Object(out))
}

/// Flatten a payload into query-string pairs using bracket notation for
/// nested values (`key[]` for lists, `key[sub]` for maps).
pub fn to_query_pairs(data: &FormData) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for (key, value) in data {
        push_pairs(&mut pairs, key.clone(), value)?;
    }
    Ok(pairs)
}

fn push_pairs(pairs: &mut Vec<(String, String)>, key: String, value: &FormValue) -> Result<()> {
    match value {
        FormValue::Null => pairs.push((key, String::new())),
        FormValue::Bool(b) => pairs.push((key, b.to_string())),
        FormValue::Number(n) => {
            // The cast is exact only inside i64 range; i64::MAX as f64
            // rounds up to 2^63, so the upper bound is exclusive.
            let integral =
                n.is_finite() && n.fract() == 0.0 && *n >= i64::MIN as f64 && *n < i64::MAX as f64;
            let rendered = if integral {
                format!("{}", *n as i64)
            } else {
                n.to_string()
            };
            pairs.push((key, rendered));
        }
        FormValue::String(s) => pairs.push((key, s.clone())),
        FormValue::File(_) => return Err(Error::FileInPayload(key)),
        FormValue::List(items) => {
            for item in items {
                push_pairs(pairs, format!("{key}[]"), item)?;
            }
        }
        FormValue::Map(entries) => {
            for (sub, item) in entries {
                push_pairs(pairs, format!("{key}[{sub}]"), item)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file() -> FileMeta {
        FileMeta {
            filename: "avatar.png".to_string(),
            content_type: "image/png".to_string(),
            content: Bytes::from_static(b"\x89PNG"),
        }
    }

    #[test]
    fn test_contains_files_recurses() {
        let mut nested = BTreeMap::new();
        nested.insert("avatar".to_string(), FormValue::File(file()));

        let mut data = FormData::new();
        data.insert("name".to_string(), FormValue::from("Tim"));
        assert!(!contains_files(&data));

        data.insert("profile".to_string(), FormValue::Map(nested));
        assert!(contains_files(&data));
    }

    #[test]
    fn test_to_json_rejects_files_with_path() {
        let mut data = FormData::new();
        data.insert("avatar".to_string(), FormValue::File(file()));
        let err = to_json(&data).unwrap_err();
        assert!(matches!(err, Error::FileInPayload(path) if path == "avatar"));
    }

    #[test]
    fn test_merge_overrides_win() {
        let mut base = FormData::new();
        base.insert("a".to_string(), FormValue::from("base"));
        base.insert("b".to_string(), FormValue::from("kept"));

        let mut overrides = FormData::new();
        overrides.insert("a".to_string(), FormValue::from("override"));

        let merged = merge(base, overrides);
        assert_eq!(merged.get("a"), Some(&FormValue::from("override")));
        assert_eq!(merged.get("b"), Some(&FormValue::from("kept")));
    }

    #[test]
    fn test_query_pairs_bracket_notation() {
        let mut address = BTreeMap::new();
        address.insert("city".to_string(), FormValue::from("Oslo"));

        let mut data = FormData::new();
        data.insert("name".to_string(), FormValue::from("Tim"));
        data.insert(
            "tags".to_string(),
            FormValue::List(vec![FormValue::from("a"), FormValue::from("b")]),
        );
        data.insert("address".to_string(), FormValue::Map(address));
        data.insert("count".to_string(), FormValue::from(3_i64));

        let pairs = to_query_pairs(&data).unwrap();
        assert!(pairs.contains(&("name".to_string(), "Tim".to_string())));
        assert!(pairs.contains(&("tags[]".to_string(), "a".to_string())));
        assert!(pairs.contains(&("tags[]".to_string(), "b".to_string())));
        assert!(pairs.contains(&("address[city]".to_string(), "Oslo".to_string())));
        assert!(pairs.contains(&("count".to_string(), "3".to_string())));
    }

    #[test]
    fn test_query_pairs_number_rendering() {
        let mut data = FormData::new();
        data.insert("count".to_string(), FormValue::Number(3.0));
        data.insert("ratio".to_string(), FormValue::Number(2.5));
        data.insert("big".to_string(), FormValue::Number(1e19));
        data.insert("small".to_string(), FormValue::Number(-1e19));

        let pairs = to_query_pairs(&data).unwrap();
        assert!(pairs.contains(&("count".to_string(), "3".to_string())));
        assert!(pairs.contains(&("ratio".to_string(), "2.5".to_string())));
        // Outside i64 range the value must render untruncated.
        assert!(pairs.contains(&("big".to_string(), "10000000000000000000".to_string())));
        assert!(pairs.contains(&("small".to_string(), "-10000000000000000000".to_string())));
    }

    #[test]
    fn test_deep_equality() {
        let mut a = BTreeMap::new();
        a.insert("city".to_string(), FormValue::from("Oslo"));
        let left = FormValue::Map(a.clone());
        let right = FormValue::Map(a);
        assert_eq!(left, right);
    }
}
