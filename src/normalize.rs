//! Conversions between the two accepted validation-error shapes.
//!
//! Servers and callers may express per-field errors either as a single
//! message ("simple") or as an ordered list of messages ("structured").
//! The structured shape is canonical inside the crate.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Canonical error shape: field name to ordered list of messages.
pub type StructuredErrors = BTreeMap<String, Vec<String>>;

/// Collapsed error shape: field name to first message only.
pub type SimpleErrors = BTreeMap<String, String>;

/// Either accepted per-field message shape, as found in 422 bodies and
/// caller-supplied error maps.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FieldMessages {
    /// A single bare message.
    One(String),
    /// An ordered list of messages.
    Many(Vec<String>),
}

impl From<String> for FieldMessages {
    fn from(message: String) -> Self {
        Self::One(message)
    }
}

impl From<&str> for FieldMessages {
    fn from(message: &str) -> Self {
        Self::One(message.to_string())
    }
}

impl From<Vec<String>> for FieldMessages {
    fn from(messages: Vec<String>) -> Self {
        Self::Many(messages)
    }
}

/// Normalize either accepted shape to the canonical structured shape.
///
/// Bare messages are wrapped in a single-element list; lists pass through
/// untouched.
pub fn to_structured<I, K>(errors: I) -> StructuredErrors
where
    I: IntoIterator<Item = (K, FieldMessages)>,
    K: Into<String>,
{
    errors
        .into_iter()
        .map(|(field, messages)| {
            let list = match messages {
                FieldMessages::One(message) => vec![message],
                FieldMessages::Many(list) => list,
            };
            (field.into(), list)
        })
        .collect()
}

/// Collapse each field's message list to its first element.
///
/// Lossy for lists of length greater than one; round-tripping through
/// [`to_structured`] keeps only the first message. Fields with an empty
/// list collapse to an empty message.
pub fn to_simple(errors: &StructuredErrors) -> SimpleErrors {
    errors
        .iter()
        .map(|(field, messages)| {
            (
                field.clone(),
                messages.first().cloned().unwrap_or_default(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_round_trip_keeps_first_message() {
        let mut errors = StructuredErrors::new();
        errors.insert("a".to_string(), vec!["x".to_string(), "y".to_string()]);

        let simple = to_simple(&errors);
        let back = to_structured(
            simple
                .into_iter()
                .map(|(k, v)| (k, FieldMessages::One(v))),
        );

        assert_eq!(back.get("a"), Some(&vec!["x".to_string()]));
    }

    #[test]
    fn test_simple_round_trip_is_lossless() {
        let structured = to_structured([("a", FieldMessages::from("x"))]);
        let simple = to_simple(&structured);
        assert_eq!(simple.get("a").map(String::as_str), Some("x"));
    }

    #[test]
    fn test_lists_pass_through_untouched() {
        let structured = to_structured([(
            "name",
            FieldMessages::from(vec!["first".to_string(), "second".to_string()]),
        )]);
        assert_eq!(
            structured.get("name"),
            Some(&vec!["first".to_string(), "second".to_string()])
        );
    }

    #[test]
    fn test_untagged_deserialization_accepts_both_shapes() {
        let parsed: BTreeMap<String, FieldMessages> =
            serde_json::from_str(r#"{"email": "Invalid", "name": ["Required", "Too short"]}"#)
                .unwrap();
        let structured = to_structured(parsed);
        assert_eq!(structured.get("email"), Some(&vec!["Invalid".to_string()]));
        assert_eq!(structured.get("name").map(Vec::len), Some(2));
    }
}
