//! Schema descriptors: the expected shape of a structured model response.
//!
//! A [`SchemaDescriptor`] wraps a JSON Schema document. It is used three
//! ways: rendered into the prompt as a hint, walked to synthesize a default
//! value when the model's output cannot be recovered, and checked against
//! recovered values so shape drift shows up in the logs.

use schemars::JsonSchema;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::json_schema_for;

/// `$ref` chains deeper than this resolve to `null`.
const MAX_DEFAULT_DEPTH: usize = 16;

/// A JSON Schema describing expected output.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDescriptor(Value);

impl SchemaDescriptor {
    /// Schema generated from a Rust type.
    pub fn for_type<T: JsonSchema>() -> Self {
        Self(json_schema_for::<T>())
    }

    /// Schema supplied as a raw JSON Schema document.
    pub fn from_value(schema: Value) -> Self {
        Self(schema)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Names of the top-level declared properties, in schema order.
    pub fn property_names(&self) -> Vec<String> {
        self.resolve(&self.0)
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// The schema as compact text for inclusion in a prompt.
    pub fn to_prompt(&self) -> String {
        serde_json::to_string_pretty(&self.0).unwrap_or_else(|_| self.0.to_string())
    }

    /// Synthesize a value with the schema's shape.
    ///
    /// Strings become the property's description (or `"Default <name>"`),
    /// numbers `0`, booleans `false`, arrays a single default element when
    /// the item type is known (empty otherwise), objects recurse, and
    /// anything else is `null`.
    pub fn default_value(&self) -> Value {
        self.default_for(&self.0, "value", 0)
    }

    /// Check `value` against the schema. Returns one line per violation.
    ///
    /// A schema that does not itself compile is treated as accepting
    /// everything.
    pub fn violations(&self, value: &Value) -> Vec<String> {
        let validator = match jsonschema::validator_for(&self.0) {
            Ok(v) => v,
            Err(e) => {
                debug!("Schema does not compile, skipping validation: {e}");
                return Vec::new();
            }
        };
        validator
            .iter_errors(value)
            .map(|e| format!("{}: {e}", e.instance_path()))
            .collect()
    }

    /// Log schema violations at WARN. Never fails.
    pub fn check(&self, value: &Value) -> bool {
        let violations = self.violations(value);
        if violations.is_empty() {
            return true;
        }
        warn!(
            "Structured output does not match schema ({} violation(s)):\n  - {}",
            violations.len(),
            violations.join("\n  - ")
        );
        false
    }

    fn default_for(&self, node: &Value, key: &str, depth: usize) -> Value {
        if depth > MAX_DEFAULT_DEPTH {
            return Value::Null;
        }
        let node = self.resolve(node);

        match primary_type(node) {
            Some("string") => {
                let text = node
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Default {key}"));
                Value::String(text)
            }
            Some("integer" | "number") => Value::from(0),
            Some("boolean") => Value::Bool(false),
            Some("array") => {
                let Some(items) = node.get("items") else {
                    return Value::Array(Vec::new());
                };
                let items = self.resolve(items);
                if primary_type(items).is_some() {
                    let item_key = format!("item for {key}");
                    Value::Array(vec![self.default_for(items, &item_key, depth + 1)])
                } else {
                    Value::Array(Vec::new())
                }
            }
            Some("object") => {
                let mut out = Map::new();
                if let Some(props) = node.get("properties").and_then(Value::as_object) {
                    for (name, prop) in props {
                        out.insert(name.clone(), self.default_for(prop, name, depth + 1));
                    }
                }
                Value::Object(out)
            }
            _ => Value::Null,
        }
    }

    /// Follow a local `$ref` (`#/definitions/..` or `#/$defs/..`).
    fn resolve<'a>(&'a self, node: &'a Value) -> &'a Value {
        let mut current = node;
        for _ in 0..MAX_DEFAULT_DEPTH {
            let Some(reference) = current.get("$ref").and_then(Value::as_str) else {
                return current;
            };
            let Some(pointer) = reference.strip_prefix('#') else {
                return current;
            };
            match self.0.pointer(pointer) {
                Some(target) => current = target,
                None => return current,
            }
        }
        current
    }
}

/// The schema's type, taking the first non-null entry of a type array.
/// Schemas with `properties` but no `type` count as objects.
fn primary_type(node: &Value) -> Option<&str> {
    match node.get("type") {
        Some(Value::String(t)) => Some(t.as_str()),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null"),
        _ if node.get("properties").is_some() => Some("object"),
        _ => None,
    }
}
