// ── Value transformer ──
//
// Criteria→result lookup applied on both data paths: device state into a
// characteristic (`get`) and characteristic value into a device command
// (`set`). Pure and free of I/O.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Criteria literal that matches anything when it sits in the final pair.
pub const WILDCARD: &str = "*";

/// Ordered flat sequence of `(criteria, result)` pairs.
///
/// `["ON", true, "OFF", false, "*", null]` maps `"ON"` to `true`, `"OFF"` to
/// `false` and anything else to `null` (which callers treat as "ignore").
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateMapping(Vec<Value>);

impl StateMapping {
    pub fn new(entries: Vec<Value>) -> Self {
        Self(entries)
    }

    pub fn entries(&self) -> &[Value] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `false` when the sequence has a dangling criteria without a result.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() % 2 == 0
    }

    /// Complete `(criteria, result)` pairs. A dangling trailing entry is skipped.
    pub fn pairs(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.0.chunks_exact(2).map(|pair| (&pair[0], &pair[1]))
    }

    /// First result whose criteria matches `value`, if any.
    pub fn lookup(&self, value: &Value) -> Option<&Value> {
        let last = self.0.len() / 2;
        let input = (!value.is_null()).then(|| display_value(value));

        self.pairs().enumerate().find_map(|(index, (criteria, result))| {
            let hit = match (criteria, &input) {
                (Value::Null, None) => true,
                (Value::Null, Some(_)) => false,
                (criteria, Some(input)) if display_value(criteria) == *input => true,
                (Value::String(s), _) => s == WILDCARD && index + 1 == last,
                _ => false,
            };
            hit.then_some(result)
        })
    }
}

impl From<Vec<Value>> for StateMapping {
    fn from(entries: Vec<Value>) -> Self {
        Self(entries)
    }
}

/// Renders as `ON=>true, OFF=>false`.
impl fmt::Display for StateMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, pair) in self.0.chunks(2).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            let criteria = display_value(&pair[0]);
            match pair.get(1) {
                Some(result) => write!(f, "{criteria}=>{}", display_value(result))?,
                None => write!(f, "{criteria}=>?")?,
            }
        }
        Ok(())
    }
}

/// Apply an optional mapping to a value.
///
/// Without a mapping, or when no pair matches, the input is returned
/// unchanged. A `null` result is returned as-is: it is up to the caller to
/// skip the update.
pub fn transform(mapping: Option<&StateMapping>, value: &Value) -> Value {
    let Some(mapping) = mapping else {
        return value.clone();
    };

    match mapping.lookup(value) {
        Some(result) => {
            debug!(%mapping, input = %display_value(value), output = %display_value(result), "value mapped");
            result.clone()
        }
        None => {
            debug!(%mapping, input = %display_value(value), "value not transformed");
            value.clone()
        }
    }
}

/// String form used for criteria comparison and command bodies.
///
/// Strings are taken verbatim, integral numbers print without a fraction
/// (`4.0` is `"4"`), booleans as `true`/`false`, `null` as `null`.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                n.as_f64().map_or_else(|| n.to_string(), |f| f.to_string())
            }
        }
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_owned(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn mapping(value: Value) -> StateMapping {
        serde_json::from_value(value).expect("mapping")
    }

    #[test]
    fn no_mapping_passes_through() {
        assert_eq!(transform(None, &json!("ON")), json!("ON"));
        assert_eq!(transform(None, &Value::Null), Value::Null);
    }

    #[test]
    fn first_matching_pair_wins() {
        let m = mapping(json!(["ON", true, "OFF", false, "ON", "never"]));
        assert_eq!(transform(Some(&m), &json!("ON")), json!(true));
        assert_eq!(transform(Some(&m), &json!("OFF")), json!(false));
    }

    #[test]
    fn criteria_compare_by_string_form() {
        let m = mapping(json!([true, "ON", false, "OFF", 1, "one"]));
        assert_eq!(transform(Some(&m), &json!(false)), json!("OFF"));
        assert_eq!(transform(Some(&m), &json!("true")), json!("ON"));
        assert_eq!(transform(Some(&m), &json!(1.0)), json!("one"));
    }

    #[test]
    fn null_criteria_matches_only_null() {
        let m = mapping(json!([null, "unknown", "null", "text"]));
        assert_eq!(transform(Some(&m), &Value::Null), json!("unknown"));
        assert_eq!(transform(Some(&m), &json!("null")), json!("text"));
        assert_eq!(transform(Some(&m), &json!("x")), json!("x"));
    }

    #[test]
    fn trailing_wildcard_is_fallback() {
        let m = mapping(json!(["ON", false, "OFF", true, "*", null]));
        assert_eq!(transform(Some(&m), &json!("ON")), json!(false));
        assert_eq!(transform(Some(&m), &json!("DIMMED")), Value::Null);
        assert_eq!(transform(Some(&m), &Value::Null), Value::Null);
    }

    #[test]
    fn wildcard_before_last_pair_is_literal() {
        let m = mapping(json!(["*", "star", "ON", true]));
        assert_eq!(transform(Some(&m), &json!("OFF")), json!("OFF"));
        assert_eq!(transform(Some(&m), &json!("*")), json!("star"));
    }

    #[test]
    fn unmatched_value_is_returned_unchanged() {
        let m = mapping(json!(["ON", true]));
        assert_eq!(transform(Some(&m), &json!(42)), json!(42));
    }

    #[test]
    fn odd_length_matches_complete_pairs_only() {
        let m = mapping(json!(["ON", true, "OFF"]));
        assert!(!m.is_well_formed());
        assert_eq!(transform(Some(&m), &json!("ON")), json!(true));
        assert_eq!(transform(Some(&m), &json!("OFF")), json!("OFF"));
    }

    #[test]
    fn display_renders_pairs() {
        let m = mapping(json!(["ON", true, "OFF", false]));
        assert_eq!(m.to_string(), "ON=>true, OFF=>false");
        assert_eq!(mapping(json!(["a"])).to_string(), "a=>?");
    }

    #[test]
    fn display_value_formats_numbers_like_text() {
        assert_eq!(display_value(&json!(4.0)), "4");
        assert_eq!(display_value(&json!(4.5)), "4.5");
        assert_eq!(display_value(&json!(-3)), "-3");
    }
}
