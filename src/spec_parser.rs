//! Best-effort loader for user supplied specification documents
//!
//! Input is tried as YAML first and as JSON second. Both decoders produce a
//! `serde_json::Value` so later stages see one representation.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpecParseError {
    #[error("specification is empty")]
    Empty,

    #[error("{format} document is empty")]
    EmptyDocument { format: &'static str },

    #[error("failed to parse specification. YAML error: {yaml}, JSON error: {json}")]
    Unparseable { yaml: String, json: String },
}

/// Parses a specification document given as YAML or JSON text
pub fn parse_spec(text: &str) -> Result<Value, SpecParseError> {
    if text.trim().is_empty() {
        return Err(SpecParseError::Empty);
    }

    let yaml_error = match serde_yaml::from_str::<serde_yaml::Value>(text) {
        Ok(doc) => return non_empty(yaml_to_json(doc), "YAML"),
        Err(e) => e.to_string(),
    };

    match serde_json::from_str::<Value>(text) {
        Ok(doc) => non_empty(doc, "JSON"),
        Err(e) => Err(SpecParseError::Unparseable {
            yaml: yaml_error,
            json: e.to_string(),
        }),
    }
}

fn non_empty(doc: Value, format: &'static str) -> Result<Value, SpecParseError> {
    let empty = match &doc {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.trim().is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    };
    if empty {
        Err(SpecParseError::EmptyDocument { format })
    } else {
        Ok(doc)
    }
}

/// Converts a YAML tree into JSON, stringifying non-string mapping keys
/// (OpenAPI `responses` are commonly keyed by bare integers like `200:`).
fn yaml_to_json(value: serde_yaml::Value) -> Value {
    use serde_yaml::Value as Yaml;

    match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(items.into_iter().map(yaml_to_json).collect()),
        Yaml::Mapping(mapping) => Value::Object(
            mapping
                .into_iter()
                .map(|(key, value)| (yaml_key(key), yaml_to_json(value)))
                .collect(),
        ),
        Yaml::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

fn yaml_key(key: serde_yaml::Value) -> String {
    match yaml_to_json(key) {
        Value::String(s) => s,
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
