//! Typed argument values and the schema-driven coercion ladder.
//!
//! Tool-call arguments arrive as raw lexemes inside a dialect's body grammar
//! (JSON text, a `key=value` pair, a bare word). This module turns a raw
//! lexeme plus a property's declared type set into a [`Value`], following the
//! same ladder regardless of which dialect produced the lexeme.

use serde_json::Value as JsonValue;
use std::fmt;

use crate::dialect::schema::TypeSet;

/// An insertion-ordered string-keyed map.
///
/// Tool arguments must round-trip in the order the model produced them, so
/// this is a flat `Vec` of pairs rather than a `HashMap`. Typical tool calls
/// have at most a handful of arguments, so linear lookup is not a concern and
/// avoids the overhead of a sidecar hash index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderedMap {
    entries: Vec<(String, Value)>,
}

impl OrderedMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, overwriting an existing key's value in place without
    /// disturbing insertion order.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl FromIterator<(String, Value)> for OrderedMap {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// A typed tool-argument value.
///
/// Mirrors the JSON Schema primitive types plus `Null`. Integers and floats
/// are kept distinct so a schema-typed `integer` property never round-trips
/// as a float.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    Array(Vec<Value>),
    Object(OrderedMap),
}

impl Value {
    /// Converts to a `serde_json::Value`, used at the boundary where this
    /// crate hands arguments to a tool handler expecting JSON.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int64(i) => JsonValue::Number((*i).into()),
            Value::Float64(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Array(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => {
                let mut obj = serde_json::Map::new();
                for (k, v) in map.iter() {
                    obj.insert(k.to_string(), v.to_json());
                }
                JsonValue::Object(obj)
            }
        }
    }

    /// Builds a [`Value`] from an already-decoded `serde_json::Value`,
    /// preserving key order from `serde_json`'s own `preserve_order` map
    /// (this crate relies on `serde_json`'s default map, which preserves
    /// insertion order as parsed from the source text).
    pub fn from_json(json: JsonValue) -> Value {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int64(i)
                } else {
                    Value::Float64(n.as_f64().unwrap_or(0.0))
                }
            }
            JsonValue::String(s) => Value::String(s),
            JsonValue::Array(items) => Value::Array(items.into_iter().map(Value::from_json).collect()),
            JsonValue::Object(obj) => {
                let mut map = OrderedMap::new();
                for (k, v) in obj {
                    map.insert(k, Value::from_json(v));
                }
                Value::Object(map)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// Strips exactly one leading and one trailing newline from a raw lexeme.
///
/// Dialect grammars often capture a body with the newline that separated it
/// from its opening sentinel still attached; this is the canonical cleanup
/// applied before the coercion ladder runs.
fn strip_one_newline(raw: &str) -> &str {
    let raw = raw.strip_prefix('\n').unwrap_or(raw);
    raw.strip_suffix('\n').unwrap_or(raw)
}

/// Runs the type-coercion ladder over a raw lexeme given the property's
/// declared type set.
///
/// `types` may be empty (no schema known for this key, or the function name
/// itself was unrecognized) in which case every raw value becomes a string.
pub fn coerce(raw: &str, types: &TypeSet) -> Value {
    let raw = strip_one_newline(raw);

    if raw.eq_ignore_ascii_case("null") {
        return Value::Null;
    }

    if types.contains_bool() {
        match raw.to_ascii_lowercase().as_str() {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {
                if types.is_sole_bool() {
                    return Value::Bool(false);
                }
            }
        }
    }

    if types.contains_integer() {
        if let Ok(i) = raw.trim().parse::<i64>() {
            return Value::Int64(widen_i32(i));
        }
        if types.is_sole(TypeSet::INTEGER) {
            return Value::String(raw.to_string());
        }
    }

    if types.contains_number() {
        if let Ok(f) = raw.trim().parse::<f64>() {
            if f.fract() == 0.0 && f.is_finite() && f.abs() < i64::MAX as f64 {
                return Value::Int64(widen_i32(f as i64));
            }
            return Value::Float64(f);
        }
        if types.is_sole(TypeSet::NUMBER) {
            return Value::String(raw.to_string());
        }
    }

    if types.contains_array() {
        if let Ok(json) = serde_json::from_str::<JsonValue>(raw) {
            if json.is_array() {
                return Value::from_json(json);
            }
        }
        if types.is_sole(TypeSet::ARRAY) {
            return Value::String(raw.to_string());
        }
    }

    if types.contains_object() {
        if let Ok(json) = serde_json::from_str::<JsonValue>(raw) {
            if json.is_object() {
                return Value::from_json(json);
            }
        }
        if types.is_sole(TypeSet::OBJECT) {
            return Value::String(raw.to_string());
        }
    }

    Value::String(raw.to_string())
}

/// Widens an `i64` that fits in `i32` by round-tripping it, matching the
/// reference ladder's preference for the narrowest integer representation.
/// Values outside `i32`'s range are kept as-is; both cases are stored in the
/// same `Int64` variant, this function exists purely to mirror the documented
/// widening behavior for values that do fit.
fn widen_i32(i: i64) -> i64 {
    if let Ok(narrow) = i32::try_from(i) {
        narrow as i64
    } else {
        i
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::schema::TypeSet;

    #[test]
    fn null_precedence_over_declared_string_type() {
        let v = coerce("null", &TypeSet::STRING);
        assert_eq!(v, Value::Null);
    }

    #[test]
    fn union_type_prefers_integer_then_falls_back() {
        let types = TypeSet::STRING | TypeSet::NUMBER;
        assert_eq!(coerce("123", &types), Value::Int64(123));
        assert_eq!(coerce("abc", &types), Value::String("abc".to_string()));
    }

    #[test]
    fn sole_boolean_invalid_token_is_false() {
        let v = coerce("maybe", &TypeSet::BOOL);
        assert_eq!(v, Value::Bool(false));
    }

    #[test]
    fn no_types_always_stringifies() {
        let v = coerce("\n123\n", &TypeSet::empty());
        assert_eq!(v, Value::String("123".to_string()));
    }

    #[test]
    fn ordered_map_overwrite_preserves_slot() {
        let mut map = OrderedMap::new();
        map.insert("a", Value::Int64(1));
        map.insert("b", Value::Int64(2));
        map.insert("a", Value::Int64(99));
        let keys: Vec<_> = map.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(map.get("a"), Some(&Value::Int64(99)));
    }

    #[test]
    fn coercion_is_idempotent() {
        let types = TypeSet::NUMBER;
        let once = coerce("3.0", &types);
        let again = coerce(&once.to_json().to_string(), &types);
        assert_eq!(once, Value::Int64(3));
        assert_eq!(again, once);
    }
}
