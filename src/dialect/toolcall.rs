//! The tool-call post-processor: turns a dialect's decoded (name, raw k/v
//! pairs) body into a fully typed [`ToolCall`], coercing each argument
//! against the matching schema entry.

use crate::dialect::schema::ToolSchemaSet;
use crate::dialect::value::{coerce, OrderedMap, Value};

/// A fully decoded, typed tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: OrderedMap,
}

/// Builds a [`ToolCall`] from a function name and its raw (not yet
/// type-coerced) argument lexemes, in the order the dialect grammar parsed
/// them.
///
/// If `name` isn't found in `schemas`, every argument becomes a `String` —
/// this is not an error; the model may have named a function that doesn't
/// exist, and the caller decides what to do with it.
pub fn build_tool_call(
    name: impl Into<String>,
    raw_args: Vec<(String, String)>,
    schemas: &ToolSchemaSet,
) -> ToolCall {
    let name = name.into();
    let schema = schemas.find(&name);

    let mut arguments = OrderedMap::new();
    for (key, raw_value) in raw_args {
        let types = schema
            .map(|s| s.property_types(&key))
            .unwrap_or_else(crate::dialect::schema::TypeSet::empty);
        arguments.insert(key, coerce(&raw_value, &types));
    }

    ToolCall { name, arguments }
}

/// Builds a [`ToolCall`] directly from an already-decoded JSON object (the
/// common case for dialects whose tool body is itself a JSON object), still
/// running each value through the coercion ladder so declared schema types
/// win over whatever JSON happened to parse to (e.g. a schema `string`
/// property whose JSON literal arrived unquoted).
pub fn build_tool_call_from_json(
    name: impl Into<String>,
    args: serde_json::Value,
    schemas: &ToolSchemaSet,
) -> ToolCall {
    let name = name.into();
    let schema = schemas.find(&name);
    let mut arguments = OrderedMap::new();

    if let serde_json::Value::Object(obj) = args {
        for (key, value) in obj {
            let types = schema
                .map(|s| s.property_types(&key))
                .unwrap_or_else(crate::dialect::schema::TypeSet::empty);
            arguments.insert(key, coerce_json_value(value, &types));
        }
    }

    ToolCall { name, arguments }
}

/// Applies the coercion ladder to an already-typed JSON value by rendering it
/// back to its lexeme form first. This keeps a single ladder implementation
/// (string-lexeme based) authoritative for both JSON-bodied and
/// syntax-bodied dialects.
fn coerce_json_value(value: serde_json::Value, types: &crate::dialect::schema::TypeSet) -> Value {
    let raw = match &value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    coerce(&raw, types)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::schema::ToolSchema;

    #[test]
    fn unknown_function_name_passes_through_as_strings() {
        let schemas = ToolSchemaSet::new(vec![]);
        let call = build_tool_call(
            "mystery",
            vec![("x".to_string(), "1".to_string())],
            &schemas,
        );
        assert_eq!(call.name, "mystery");
        assert_eq!(call.arguments.get("x"), Some(&Value::String("1".to_string())));
    }

    #[test]
    fn known_function_coerces_against_schema() {
        let schema = ToolSchema::from_json_schema(
            "add",
            &serde_json::json!({"properties": {"x": {"type": "integer"}}}),
        );
        let schemas = ToolSchemaSet::new(vec![schema]);
        let call = build_tool_call("add", vec![("x".to_string(), "42".to_string())], &schemas);
        assert_eq!(call.arguments.get("x"), Some(&Value::Int64(42)));
    }
}
