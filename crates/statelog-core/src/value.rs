#![forbid(unsafe_code)]

//! Value domain for tracked state.
//!
//! Tracked values are captured as [`serde_json::Value`] at the adapter
//! boundary. The registry stores them verbatim; this module only classifies
//! them ([`TypeTag`]), compares them ([`structurally_equal`]) and formats them
//! for display ([`render_value`]).
//!
//! # Equality
//!
//! Structural equality is exact-shape equality over the JSON model:
//!
//! - objects compare by content (key order does not matter),
//! - arrays compare element-wise in order,
//! - numbers compare by representation (`1` and `1.0` differ, no tolerance).

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// Coarse classification of a tracked value, recomputed on every observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Null,
    Boolean,
    Number,
    String,
    /// List-like values.
    Sequence,
    Object,
}

impl TypeTag {
    /// Classify a value.
    #[must_use]
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Sequence,
            Value::Object(_) => Self::Object,
        }
    }

    /// Display name shown next to a value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Sequence => "array",
            Self::Object => "object",
        }
    }

    /// True for values rendered as structured (multi-line) text.
    #[must_use]
    pub const fn is_structured(self) -> bool {
        matches!(self, Self::Sequence | Self::Object)
    }
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deep structural equality over the value domain.
#[inline]
#[must_use]
pub fn structurally_equal(a: &Value, b: &Value) -> bool {
    a == b
}

/// Capture a tracked value as JSON.
///
/// Serialization failures (e.g. maps with non-string keys) degrade to
/// [`Value::Null`]; tracking never fails the caller.
pub fn capture<T: Serialize + ?Sized>(value: &T) -> Value {
    match serde_json::to_value(value) {
        Ok(v) => v,
        Err(err) => {
            warn!(error = %err, "tracked value is not representable, recording null");
            Value::Null
        }
    }
}

/// Format a value for display.
///
/// Objects and arrays are pretty-printed; strings are shown raw; other
/// scalars use their JSON text.
#[must_use]
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn tags_cover_every_shape() {
        assert_eq!(TypeTag::of(&json!(null)), TypeTag::Null);
        assert_eq!(TypeTag::of(&json!(true)), TypeTag::Boolean);
        assert_eq!(TypeTag::of(&json!(3)), TypeTag::Number);
        assert_eq!(TypeTag::of(&json!("x")), TypeTag::String);
        assert_eq!(TypeTag::of(&json!([1, 2])), TypeTag::Sequence);
        assert_eq!(TypeTag::of(&json!({"a": 1})), TypeTag::Object);
    }

    #[test]
    fn sequence_displays_as_array() {
        assert_eq!(TypeTag::Sequence.to_string(), "array");
        assert!(TypeTag::Sequence.is_structured());
        assert!(!TypeTag::Number.is_structured());
    }

    #[test]
    fn object_equality_ignores_key_order() {
        let a: Value = serde_json::from_str(r#"{"a":1,"b":[1,2]}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"b":[1,2],"a":1}"#).unwrap();
        assert!(structurally_equal(&a, &b));
    }

    #[test]
    fn number_representation_matters() {
        assert!(!structurally_equal(&json!(1), &json!(1.0)));
        assert!(!structurally_equal(&json!([1, 2]), &json!([2, 1])));
    }

    #[test]
    fn unrepresentable_value_degrades_to_null() {
        let mut map = HashMap::new();
        map.insert((1, 2), "pair");
        assert_eq!(capture(&map), Value::Null);
    }

    #[test]
    fn capture_structs() {
        #[derive(Serialize)]
        struct Todo {
            title: &'static str,
            done: bool,
        }
        let v = capture(&Todo {
            title: "write",
            done: false,
        });
        assert_eq!(v, json!({"title": "write", "done": false}));
    }

    #[test]
    fn render_forms() {
        assert_eq!(render_value(&json!("plain")), "plain");
        assert_eq!(render_value(&json!(42)), "42");
        assert_eq!(render_value(&json!(null)), "null");
        assert_eq!(render_value(&json!([1])), "[\n  1\n]");
    }
}
