//! Tool schemas and the type-set used to drive [`super::value::coerce`].

use serde_json::Value as JsonValue;
use std::ops::BitOr;

use crate::dialect::value::OrderedMap;

/// A set of JSON Schema primitive type tags.
///
/// Stored as a bitset rather than `Vec<String>` since the set is small,
/// closed, and tested with simple membership/cardinality checks throughout
/// the coercion ladder. An `anyOf` union flattens directly into this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TypeSet(u8);

impl TypeSet {
    pub const NULL: TypeSet = TypeSet(1 << 0);
    pub const BOOL: TypeSet = TypeSet(1 << 1);
    pub const INTEGER: TypeSet = TypeSet(1 << 2);
    pub const NUMBER: TypeSet = TypeSet(1 << 3);
    pub const STRING: TypeSet = TypeSet(1 << 4);
    pub const ARRAY: TypeSet = TypeSet(1 << 5);
    pub const OBJECT: TypeSet = TypeSet(1 << 6);

    pub const fn empty() -> Self {
        TypeSet(0)
    }

    pub fn contains(&self, other: TypeSet) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn contains_bool(&self) -> bool {
        self.contains(Self::BOOL)
    }

    pub fn contains_integer(&self) -> bool {
        self.contains(Self::INTEGER)
    }

    pub fn contains_number(&self) -> bool {
        self.contains(Self::NUMBER)
    }

    pub fn contains_array(&self) -> bool {
        self.contains(Self::ARRAY)
    }

    pub fn contains_object(&self) -> bool {
        self.contains(Self::OBJECT)
    }

    /// True if `other` is the only type tag set (used by the ladder's
    /// "sole-type fallback to String" rule).
    pub fn is_sole(&self, other: TypeSet) -> bool {
        self.0 == other.0
    }

    pub fn is_sole_bool(&self) -> bool {
        self.is_sole(Self::BOOL)
    }

    fn from_token(token: &str) -> TypeSet {
        match token {
            "null" => TypeSet::NULL,
            "boolean" => TypeSet::BOOL,
            "integer" => TypeSet::INTEGER,
            "number" => TypeSet::NUMBER,
            "string" => TypeSet::STRING,
            "array" => TypeSet::ARRAY,
            "object" => TypeSet::OBJECT,
            // Anything unrecognized is treated as string, per the schema
            // wire-format rule: unknown type tokens default to `string`.
            _ => TypeSet::STRING,
        }
    }

    /// Parses a JSON Schema `type` field, which may be a single string or an
    /// array of strings.
    fn from_json_type_field(value: &JsonValue) -> TypeSet {
        match value {
            JsonValue::String(s) => Self::from_token(s),
            JsonValue::Array(items) => items.iter().fold(TypeSet::empty(), |acc, v| {
                acc | v.as_str().map(Self::from_token).unwrap_or(TypeSet::STRING)
            }),
            _ => TypeSet::empty(),
        }
    }
}

impl BitOr for TypeSet {
    type Output = TypeSet;
    fn bitor(self, rhs: TypeSet) -> TypeSet {
        TypeSet(self.0 | rhs.0)
    }
}

/// A single property's declared type set, flattened from `type`/`anyOf`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySchema {
    pub types: TypeSet,
}

impl PropertySchema {
    fn from_json(value: &JsonValue) -> PropertySchema {
        let mut types = TypeSet::empty();

        if let Some(t) = value.get("type") {
            types = types | TypeSet::from_json_type_field(t);
        }

        if let Some(JsonValue::Array(variants)) = value.get("anyOf") {
            for variant in variants {
                if let Some(t) = variant.get("type") {
                    types = types | TypeSet::from_json_type_field(t);
                }
            }
        }

        PropertySchema { types }
    }
}

/// A function's argument schema: an ordered list of named, typed properties.
///
/// Order matches the JSON Schema's `properties` object as received — this
/// crate relies on `serde_json`'s map preserving source order, which is what
/// lets a schema round-trip the same property order the model was shown.
#[derive(Debug, Clone, Default)]
pub struct ToolSchema {
    pub name: String,
    properties: PropertyList,
}

/// Ordered list of named property schemas; kept private to this module since
/// callers only need `property_types`/`property_names`.
#[derive(Debug, Clone, Default)]
struct PropertyList {
    entries: Vec<(String, PropertySchema)>,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>) -> Self {
        ToolSchema {
            name: name.into(),
            properties: PropertyList::default(),
        }
    }

    /// Builds a [`ToolSchema`] from a JSON Schema object (the `parameters`
    /// field of a tool definition): `type: "object"`, `properties: {...}`.
    pub fn from_json_schema(name: impl Into<String>, schema: &JsonValue) -> ToolSchema {
        let mut tool = ToolSchema::new(name);
        if let Some(JsonValue::Object(props)) = schema.get("properties") {
            for (key, prop_schema) in props {
                tool.properties
                    .entries
                    .push((key.clone(), PropertySchema::from_json(prop_schema)));
            }
        }
        tool
    }

    pub fn property_types(&self, key: &str) -> TypeSet {
        self.properties
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, p)| p.types)
            .unwrap_or_else(TypeSet::empty)
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.entries.iter().map(|(k, _)| k.as_str())
    }
}

/// An immutable list of tool schemas handed to a parser at `init` time.
#[derive(Debug, Clone, Default)]
pub struct ToolSchemaSet {
    schemas: Vec<ToolSchema>,
}

impl ToolSchemaSet {
    pub fn new(schemas: Vec<ToolSchema>) -> Self {
        ToolSchemaSet { schemas }
    }

    pub fn find(&self, name: &str) -> Option<&ToolSchema> {
        self.schemas.iter().find(|s| s.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolSchema> {
        self.schemas.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn any_of_flattens_to_union() {
        let schema = json!({
            "properties": {
                "value": {"anyOf": [{"type": "string"}, {"type": "integer"}]}
            }
        });
        let tool = ToolSchema::from_json_schema("f", &schema);
        let types = tool.property_types("value");
        assert!(types.contains(TypeSet::STRING));
        assert!(types.contains_integer());
    }

    #[test]
    fn unknown_type_token_defaults_to_string() {
        assert_eq!(TypeSet::from_token("frobnicate"), TypeSet::STRING);
    }

    #[test]
    fn property_order_matches_source() {
        let schema = json!({
            "properties": {
                "z": {"type": "string"},
                "a": {"type": "string"},
            }
        });
        let tool = ToolSchema::from_json_schema("f", &schema);
        let names: Vec<_> = tool.property_names().collect();
        assert_eq!(names, vec!["z", "a"]);
    }
}
