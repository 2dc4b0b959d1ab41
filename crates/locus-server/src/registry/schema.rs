// crates/locus-server/src/registry/schema.rs
// Canonical parameter schemas and argument validation

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{BrokerError, Result};

/// Parameter value types accepted by tool schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }

    /// Shallow type check. Array elements are deliberately not checked.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
        }
    }
}

/// One property in a tool's parameter schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySpec {
    #[serde(rename = "type")]
    pub kind: ParamType,
    #[serde(default)]
    pub description: String,
    /// Closed set of accepted values, when present.
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
    /// Filled in for absent optional arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// The canonical parameter schema for one tool.
///
/// There is exactly one representation; the MCP `inputSchema` shape is
/// derived from it at the protocol surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamSchema {
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySpec>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl ParamSchema {
    /// Every name in `required` must name a property.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        for name in &self.required {
            if !self.properties.contains_key(name) {
                return Err(format!("required property `{name}` is not declared"));
            }
        }
        Ok(())
    }

    /// Render the MCP `inputSchema` object for this schema.
    pub fn to_input_schema(&self) -> Value {
        let mut properties = Map::new();
        for (name, spec) in &self.properties {
            let mut prop = Map::new();
            prop.insert("type".to_string(), json!(spec.kind.as_str()));
            if !spec.description.is_empty() {
                prop.insert("description".to_string(), json!(spec.description));
            }
            if let Some(allowed) = &spec.allowed {
                prop.insert("enum".to_string(), Value::Array(allowed.clone()));
            }
            if let Some(default) = &spec.default {
                prop.insert("default".to_string(), default.clone());
            }
            properties.insert(name.clone(), Value::Object(prop));
        }
        json!({
            "type": "object",
            "properties": Value::Object(properties),
            "required": self.required,
        })
    }
}

/// A single argument-validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingRequired(String),
    WrongType {
        name: String,
        expected: &'static str,
    },
    NotInEnum(String),
    NotAnObject,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingRequired(name) => {
                write!(f, "missing required property `{name}`")
            }
            ValidationError::WrongType { name, expected } => {
                write!(f, "property `{name}` must be of type {expected}")
            }
            ValidationError::NotInEnum(name) => {
                write!(f, "property `{name}` is not one of the allowed values")
            }
            ValidationError::NotAnObject => write!(f, "arguments must be a JSON object"),
        }
    }
}

/// Validate `args` against `schema`.
///
/// Returns the argument object with schema defaults filled in for absent
/// optional properties. Unknown properties pass through untouched. All
/// violations are collected and joined into one `InvalidArguments` message.
pub fn validate(schema: &ParamSchema, args: &Value) -> Result<Map<String, Value>> {
    let mut validated = match args {
        Value::Null => Map::new(),
        Value::Object(map) => map.clone(),
        _ => {
            return Err(BrokerError::InvalidArguments(
                ValidationError::NotAnObject.to_string(),
            ));
        }
    };

    let mut errors: Vec<ValidationError> = Vec::new();

    for name in &schema.required {
        if !validated.contains_key(name) {
            errors.push(ValidationError::MissingRequired(name.clone()));
        }
    }

    for (name, spec) in &schema.properties {
        match validated.get(name) {
            Some(value) => {
                if !spec.kind.matches(value) {
                    errors.push(ValidationError::WrongType {
                        name: name.clone(),
                        expected: spec.kind.as_str(),
                    });
                    continue;
                }
                if let Some(allowed) = &spec.allowed
                    && !allowed.contains(value)
                {
                    errors.push(ValidationError::NotInEnum(name.clone()));
                }
            }
            None => {
                if let Some(default) = &spec.default {
                    validated.insert(name.clone(), default.clone());
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(validated)
    } else {
        let message = errors
            .iter()
            .map(ValidationError::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Err(BrokerError::InvalidArguments(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> ParamSchema {
        let mut properties = BTreeMap::new();
        properties.insert(
            "sequence".to_string(),
            PropertySpec {
                kind: ParamType::String,
                description: "DNA sequence".to_string(),
                allowed: None,
                default: None,
            },
        );
        properties.insert(
            "frame".to_string(),
            PropertySpec {
                kind: ParamType::Number,
                description: "Reading frame".to_string(),
                allowed: Some(vec![json!(0), json!(1), json!(2)]),
                default: Some(json!(0)),
            },
        );
        ParamSchema {
            properties,
            required: vec!["sequence".to_string()],
        }
    }

    #[test]
    fn missing_required_names_the_property() {
        let err = validate(&sample_schema(), &json!({"frame": 1})).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("sequence"), "got: {msg}");
    }

    #[test]
    fn defaults_are_filled() {
        let out = validate(&sample_schema(), &json!({"sequence": "ATCG"})).unwrap();
        assert_eq!(out["frame"], json!(0));
    }

    #[test]
    fn wrong_type_rejected() {
        let err = validate(&sample_schema(), &json!({"sequence": 42})).unwrap_err();
        assert!(err.to_string().contains("type string"));
    }

    #[test]
    fn enum_enforced() {
        let err =
            validate(&sample_schema(), &json!({"sequence": "ATCG", "frame": 5})).unwrap_err();
        assert!(err.to_string().contains("allowed values"));
    }

    #[test]
    fn unknown_properties_pass_through() {
        let out =
            validate(&sample_schema(), &json!({"sequence": "A", "extra": true})).unwrap();
        assert_eq!(out["extra"], json!(true));
    }

    #[test]
    fn null_args_ok_for_all_optional() {
        let schema = ParamSchema::default();
        let out = validate(&schema, &Value::Null).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn all_violations_reported() {
        let err = validate(&sample_schema(), &json!({"frame": "x"})).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("sequence") && msg.contains("frame"), "got: {msg}");
    }

    #[test]
    fn invariant_catches_undeclared_required() {
        let schema = ParamSchema {
            properties: BTreeMap::new(),
            required: vec!["ghost".to_string()],
        };
        assert!(schema.check_invariants().is_err());
    }

    #[test]
    fn input_schema_shape() {
        let rendered = sample_schema().to_input_schema();
        assert_eq!(rendered["type"], "object");
        assert_eq!(rendered["properties"]["sequence"]["type"], "string");
        assert_eq!(rendered["properties"]["frame"]["default"], json!(0));
        assert_eq!(rendered["required"][0], "sequence");
    }
}
