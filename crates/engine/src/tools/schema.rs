//! Tool Schemas
//!
//! Declared inputs and outputs of a registered tool. Schemas feed the
//! workflow generator and gate invocation; they are never consulted when
//! resolving context references.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::workflow::resolve::kind_of;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    Null,
    /// Any type name we don't check, e.g. `file` or `any`.
    #[serde(other)]
    Any,
}

impl ParamType {
    /// Superficial compatibility check used before dispatch.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
            ParamType::Null => value.is_null(),
            ParamType::Any => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
            ParamType::Null => "null",
            ParamType::Any => "any",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
}

impl ToolParameter {
    pub fn new(param_type: ParamType) -> Self {
        Self {
            param_type,
            description: None,
            default: None,
            allowed: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn one_of(mut self, allowed: Vec<Value>) -> Self {
        self.allowed = Some(allowed);
        self
    }
}

fn object_type() -> String {
    "object".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameters {
    #[serde(rename = "type", default = "object_type")]
    pub kind: String,
    #[serde(default)]
    pub properties: IndexMap<String, ToolParameter>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl Default for ToolParameters {
    fn default() -> Self {
        Self {
            kind: object_type(),
            properties: IndexMap::new(),
            required: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolReturns {
    #[serde(rename = "type")]
    pub return_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Value>,
}

impl Default for ToolReturns {
    fn default() -> Self {
        Self {
            return_type: "object".to_string(),
            properties: None,
            items: None,
        }
    }
}

/// A tool as advertised to planners: name, purpose, inputs, and output shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: ToolParameters,
    #[serde(default)]
    pub returns: ToolReturns,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: ToolParameters::default(),
            returns: ToolReturns::default(),
        }
    }

    pub fn required(mut self, name: impl Into<String>, parameter: ToolParameter) -> Self {
        let name = name.into();
        self.parameters.required.push(name.clone());
        self.parameters.properties.insert(name, parameter);
        self
    }

    pub fn optional(mut self, name: impl Into<String>, parameter: ToolParameter) -> Self {
        self.parameters.properties.insert(name.into(), parameter);
        self
    }

    pub fn returns(mut self, return_type: impl Into<String>) -> Self {
        self.returns.return_type = return_type.into();
        self
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.parameters.required.iter().any(|r| r == name)
    }

    /// Fills in declared defaults for optional parameters the caller omitted.
    pub fn apply_defaults(&self, arguments: &mut Map<String, Value>) {
        for (name, parameter) in &self.parameters.properties {
            if let Some(default) = &parameter.default {
                if !arguments.contains_key(name) {
                    arguments.insert(name.clone(), default.clone());
                }
            }
        }
    }

    /// Checks required names, declared types, and enums. Undeclared
    /// arguments pass through.
    pub fn validate_arguments(&self, arguments: &Map<String, Value>) -> Result<(), String> {
        let missing: Vec<&str> = self
            .parameters
            .required
            .iter()
            .filter(|name| !arguments.contains_key(name.as_str()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(format!("missing required parameter(s): {}", missing.join(", ")));
        }

        for (name, value) in arguments {
            let Some(parameter) = self.parameters.properties.get(name) else {
                continue;
            };
            if value.is_null() && !self.is_required(name) {
                continue;
            }
            if !parameter.param_type.accepts(value) {
                return Err(format!(
                    "parameter '{}' expects {}, got {}",
                    name,
                    parameter.param_type.as_str(),
                    kind_of(value)
                ));
            }
            if let Some(allowed) = &parameter.allowed {
                if !allowed.contains(value) {
                    return Err(format!(
                        "parameter '{}' must be one of {}, got {}",
                        name,
                        Value::Array(allowed.clone()),
                        value
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn add_schema() -> ToolSchema {
        ToolSchema::new("add", "Add two numbers")
            .required("a", ToolParameter::new(ParamType::Integer).describe("First number"))
            .required("b", ToolParameter::new(ParamType::Number))
            .optional(
                "unit",
                ToolParameter::new(ParamType::String)
                    .with_default("none")
                    .one_of(vec![json!("none"), json!("kg")]),
            )
            .returns("number")
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_missing_required() {
        let err = add_schema().validate_arguments(&args(json!({"a": 1}))).unwrap_err();
        assert_eq!(err, "missing required parameter(s): b");
    }

    #[test]
    fn test_type_mismatch() {
        let schema = add_schema();
        let err = schema
            .validate_arguments(&args(json!({"a": "2", "b": 3})))
            .unwrap_err();
        assert_eq!(err, "parameter 'a' expects integer, got a string");

        let err = schema
            .validate_arguments(&args(json!({"a": 2.5, "b": 3})))
            .unwrap_err();
        assert!(err.contains("expects integer"));
    }

    #[test]
    fn test_enum_and_defaults() {
        let schema = add_schema();
        let mut arguments = args(json!({"a": 1, "b": 2.5}));
        schema.apply_defaults(&mut arguments);
        assert_eq!(arguments["unit"], json!("none"));
        assert!(schema.validate_arguments(&arguments).is_ok());

        let err = schema
            .validate_arguments(&args(json!({"a": 1, "b": 2, "unit": "lb"})))
            .unwrap_err();
        assert!(err.contains("must be one of"));
    }

    #[test]
    fn test_extra_and_null_optional_arguments_pass() {
        let schema = add_schema();
        assert!(schema
            .validate_arguments(&args(json!({"a": 1, "b": 2, "unit": null, "extra": [1]})))
            .is_ok());
    }

    #[test]
    fn test_deserializes_loose_schema() {
        let schema: ToolSchema = serde_json::from_str(
            r#"{
                "name": "dock",
                "description": "Run a docking job",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "receptor": {"type": "file", "description": "PDB path"},
                        "exhaustiveness": {"type": "integer", "default": 8}
                    },
                    "required": ["receptor"]
                },
                "returns": {"type": "object", "properties": {"score": {"type": "number"}}}
            }"#,
        )
        .unwrap();
        assert_eq!(schema.parameters.properties["receptor"].param_type, ParamType::Any);
        assert_eq!(
            schema.parameters.properties.keys().collect::<Vec<_>>(),
            vec!["receptor", "exhaustiveness"]
        );
        assert!(schema.is_required("receptor"));
    }

    #[test]
    fn test_every_param_type_accepts_only_its_shape() {
        let samples = [
            json!("text"),
            json!(2.5),
            json!(7),
            json!(true),
            json!({"k": 1}),
            json!([1, 2]),
            json!(null),
        ];
        let table = [
            (ParamType::String, [true, false, false, false, false, false, false]),
            (ParamType::Number, [false, true, true, false, false, false, false]),
            (ParamType::Integer, [false, false, true, false, false, false, false]),
            (ParamType::Boolean, [false, false, false, true, false, false, false]),
            (ParamType::Object, [false, false, false, false, true, false, false]),
            (ParamType::Array, [false, false, false, false, false, true, false]),
            (ParamType::Null, [false, false, false, false, false, false, true]),
            (ParamType::Any, [true; 7]),
        ];
        for (param_type, expected) in table {
            for (sample, accepted) in samples.iter().zip(expected) {
                assert_eq!(
                    param_type.accepts(sample),
                    accepted,
                    "{} against {}",
                    param_type.as_str(),
                    sample
                );
            }
        }
    }

    #[test]
    fn test_boolean_object_array_mismatches_are_reported() {
        let schema = ToolSchema::new("filter", "Filter rows")
            .required("strict", ToolParameter::new(ParamType::Boolean))
            .required("rules", ToolParameter::new(ParamType::Object))
            .required("rows", ToolParameter::new(ParamType::Array));
        assert!(schema
            .validate_arguments(&args(json!({"strict": false, "rules": {}, "rows": []})))
            .is_ok());

        let err = schema
            .validate_arguments(&args(json!({"strict": "yes", "rules": {}, "rows": []})))
            .unwrap_err();
        assert_eq!(err, "parameter 'strict' expects boolean, got a string");
        let err = schema
            .validate_arguments(&args(json!({"strict": true, "rules": [], "rows": []})))
            .unwrap_err();
        assert_eq!(err, "parameter 'rules' expects object, got a sequence");
        let err = schema
            .validate_arguments(&args(json!({"strict": true, "rules": {}, "rows": {"a": 1}})))
            .unwrap_err();
        assert_eq!(err, "parameter 'rows' expects array, got a mapping");
    }
}
