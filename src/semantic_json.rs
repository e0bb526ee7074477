//! Semantic comparison of JSON-encoded string attributes.
//!
//! Attributes such as `extended_attributes` hold a whole JSON document as a
//! string. Comparing those strings byte for byte reports a change whenever the
//! user reformats the document or reorders keys. The comparator here parses
//! both sides, canonicalizes them, and only reports a change when the
//! documents differ.
//!
//! # Example
//!
//! ```
//! use dbtcloud_provider::semantic_json::{suppress_if_equivalent, ComparatorOutcome};
//!
//! let outcome = suppress_if_equivalent(Some(r#"{"a":1,"b":2}"#), Some(r#"{ "b": 2, "a": 1 }"#));
//! assert_eq!(outcome, ComparatorOutcome::Equivalent(r#"{ "b": 2, "a": 1 }"#.to_string()));
//!
//! let outcome = suppress_if_equivalent(Some(r#"{"a":1}"#), Some(r#"{"a":2}"#));
//! assert_eq!(outcome, ComparatorOutcome::Changed);
//! ```

use serde_json::{Map, Number, Value};

/// The verdict of [`suppress_if_equivalent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComparatorOutcome {
    /// Both texts encode the same document. Holds the proposed text, which
    /// should be kept as the effective value.
    Equivalent(String),
    /// The texts differ, or could not be compared.
    Changed,
}

impl ComparatorOutcome {
    /// Whether the pending change should be hidden.
    pub fn is_suppressed(&self) -> bool {
        matches!(self, Self::Equivalent(_))
    }

    /// The effective text, falling back to `proposed` when nothing was
    /// suppressed.
    pub fn effective_or<'a>(&'a self, proposed: &'a str) -> &'a str {
        match self {
            Self::Equivalent(text) => text,
            Self::Changed => proposed,
        }
    }
}

/// Decide whether `proposed` only differs from `stored` in formatting.
///
/// Returns [`ComparatorOutcome::Changed`] when either side is missing or is
/// not a JSON object. Parse failures are not errors here; malformed input is
/// reported by attribute validation.
pub fn suppress_if_equivalent(stored: Option<&str>, proposed: Option<&str>) -> ComparatorOutcome {
    let (Some(stored), Some(proposed)) = (stored, proposed) else {
        return ComparatorOutcome::Changed;
    };

    match (canonicalize(stored), canonicalize(proposed)) {
        (Some(a), Some(b)) if a == b => ComparatorOutcome::Equivalent(proposed.to_string()),
        _ => ComparatorOutcome::Changed,
    }
}

/// Largest integer every JSON reader holds exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Parse `text` as a JSON object and render it with sorted keys and no
/// whitespace. Returns `None` if `text` is not a JSON object.
///
/// Numbers compare by value: `1`, `1.0` and `1e0` share one rendering, as do
/// `-0` and `0`.
pub fn canonicalize(text: &str) -> Option<String> {
    let object: Map<String, Value> = serde_json::from_str(text).ok()?;
    serde_json::to_string(&normalize(Value::Object(object))).ok()
}

fn normalize(value: Value) -> Value {
    match value {
        Value::Object(object) => Value::Object(
            object
                .into_iter()
                .map(|(key, value)| (key, normalize(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        Value::Number(number) => Value::Number(normalize_number(number)),
        scalar => scalar,
    }
}

fn normalize_number(number: Number) -> Number {
    let Some(float) = number.as_f64() else {
        return number;
    };
    if float.fract() == 0.0 && float.abs() <= MAX_SAFE_INTEGER {
        // Also folds -0 into 0.
        Number::from(float as i64)
    } else {
        Number::from_f64(float).unwrap_or(number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn equivalent(stored: &str, proposed: &str) -> bool {
        suppress_if_equivalent(Some(stored), Some(proposed)).is_suppressed()
    }

    #[test]
    fn test_key_order_is_ignored() {
        assert!(equivalent(r#"{"a":1,"b":2}"#, r#"{"b":2,"a":1}"#));
    }

    #[test]
    fn test_whitespace_is_ignored() {
        assert!(equivalent(r#"{"a": 1}"#, r#"{"a":1}"#));
        assert!(equivalent("{\n  \"a\": {\n    \"b\": [1, 2]\n  }\n}", r#"{"a":{"b":[1,2]}}"#));
    }

    #[test]
    fn test_different_key_sets_are_changes() {
        assert!(!equivalent(r#"{"a":1}"#, r#"{"a":1,"b":2}"#));
    }

    #[test]
    fn test_value_types_matter() {
        assert!(!equivalent(r#"{"a":1}"#, r#"{"a":"1"}"#));
        assert!(!equivalent(r#"{"a":null}"#, r#"{"a":false}"#));
        assert!(!equivalent(r#"{"a":{}}"#, r#"{"a":[]}"#));
    }

    #[test]
    fn test_numbers_compare_by_value() {
        assert!(equivalent(r#"{"a":1}"#, r#"{"a":1.0}"#));
        assert!(equivalent(r#"{"a":100}"#, r#"{"a":1e2}"#));
        assert!(equivalent(r#"{"a":-0}"#, r#"{"a":0}"#));
        assert!(equivalent(r#"{"a":[2.50]}"#, r#"{"a":[25e-1]}"#));
        assert!(!equivalent(r#"{"a":1}"#, r#"{"a":1.5}"#));
    }

    #[test]
    fn test_nested_container_kind_matters() {
        assert!(!equivalent(
            r#"{"a":{"b":[{"c":1}]}}"#,
            r#"{"a":{"b":{"c":[1]}}}"#,
        ));
    }

    #[test]
    fn test_array_order_matters() {
        assert!(!equivalent(r#"{"a":[1,2]}"#, r#"{"a":[2,1]}"#));
    }

    #[test]
    fn test_nested_key_order_is_ignored() {
        assert!(equivalent(
            r#"{"outer":{"x":1,"y":{"p":true,"q":null}}}"#,
            r#"{"outer":{"y":{"q":null,"p":true},"x":1}}"#,
        ));
        assert!(equivalent(
            r#"{"list":[{"a":1,"b":2}]}"#,
            r#"{"list":[{"b":2,"a":1}]}"#,
        ));
    }

    #[test]
    fn test_missing_side_is_a_change() {
        assert_eq!(
            suppress_if_equivalent(None, Some(r#"{"a":1}"#)),
            ComparatorOutcome::Changed
        );
        assert_eq!(
            suppress_if_equivalent(Some(r#"{"a":1}"#), None),
            ComparatorOutcome::Changed
        );
        assert_eq!(suppress_if_equivalent(None, None), ComparatorOutcome::Changed);
    }

    #[test]
    fn test_invalid_json_fails_open() {
        assert_eq!(
            suppress_if_equivalent(Some("not json"), Some(r#"{"a":1}"#)),
            ComparatorOutcome::Changed
        );
        assert_eq!(
            suppress_if_equivalent(Some(r#"{"a":1}"#), Some("{\"a\":")),
            ComparatorOutcome::Changed
        );
    }

    #[test]
    fn test_non_object_documents_are_not_compared() {
        assert!(!equivalent("[1,2]", "[1, 2]"));
        assert!(!equivalent("1", "1"));
    }

    #[test]
    fn test_equivalent_keeps_proposed_text() {
        let proposed = "{ \"b\": 2,\n  \"a\": 1 }";
        let outcome = suppress_if_equivalent(Some(r#"{"a":1,"b":2}"#), Some(proposed));
        assert_eq!(outcome, ComparatorOutcome::Equivalent(proposed.to_string()));
        assert_eq!(outcome.effective_or("ignored"), proposed);
        assert_eq!(ComparatorOutcome::Changed.effective_or(proposed), proposed);
    }

    #[test]
    fn test_relation_is_reflexive_and_symmetric() {
        let a = r#"{"k":[1,{"z":0,"y":"s"}],"m":null}"#;
        let b = r#"{ "m": null, "k": [1, {"y": "s", "z": 0}] }"#;
        assert!(equivalent(a, a));
        assert!(equivalent(a, b));
        assert!(equivalent(b, a));
    }

    #[test]
    fn test_comparison_is_idempotent() {
        let first = suppress_if_equivalent(Some(r#"{"a":1}"#), Some(r#"{"a": 1}"#));
        let second = suppress_if_equivalent(Some(r#"{"a":1}"#), Some(r#"{"a": 1}"#));
        assert_eq!(first, second);
    }

    #[test]
    fn test_canonical_form() {
        assert_eq!(
            canonicalize(r#"{ "b": "x\"y", "a": [ 1, 2.5, true ] }"#).as_deref(),
            Some(r#"{"a":[1,2.5,true],"b":"x\"y"}"#)
        );
        assert_eq!(canonicalize("{}").as_deref(), Some("{}"));
        assert_eq!(
            canonicalize(r#"{"n":1.0,"m":-0.0,"f":0.25}"#).as_deref(),
            Some(r#"{"f":0.25,"m":0,"n":1}"#)
        );
        assert_eq!(canonicalize("[]"), None);
    }
}
