//! Local Callable Tools
//!
//! In-process functions invoked with the resolved argument map.

use anyhow::anyhow;
use serde_json::{json, Map, Value};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use super::schema::{ParamType, ToolParameter, ToolSchema};

pub type LocalFn = dyn Fn(&Map<String, Value>) -> anyhow::Result<Value> + Send + Sync;

#[derive(Clone)]
pub struct LocalTool {
    func: Arc<LocalFn>,
}

impl LocalTool {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
        }
    }

    /// Calls the function; a panic is reported as an ordinary error.
    pub fn call(&self, arguments: &Map<String, Value>) -> anyhow::Result<Value> {
        match catch_unwind(AssertUnwindSafe(|| (self.func)(arguments))) {
            Ok(result) => result,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "tool panicked".to_string());
                Err(anyhow!("panicked: {}", message))
            }
        }
    }
}

impl fmt::Debug for LocalTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LocalTool")
    }
}

/// Integers stay integers when both operands are integral.
fn arithmetic(
    a: &Value,
    b: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> anyhow::Result<Value> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(result) = int_op(x, y) {
            return Ok(json!(result));
        }
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => Ok(json!(float_op(x, y))),
        _ => Err(anyhow!("operands must be numbers, got {} and {}", a, b)),
    }
}

/// Built-in tools always available to the CLI.
pub fn builtin_tools() -> Vec<(ToolSchema, LocalTool)> {
    vec![
        (
            ToolSchema::new("echo", "Return the given value unchanged")
                .required("value", ToolParameter::new(ParamType::Any).describe("Any value"))
                .returns("any"),
            LocalTool::new(|args| Ok(args.get("value").cloned().unwrap_or(Value::Null))),
        ),
        (
            ToolSchema::new("add", "Add two numbers")
                .required("a", ToolParameter::new(ParamType::Number).describe("First number"))
                .required("b", ToolParameter::new(ParamType::Number).describe("Second number"))
                .returns("number"),
            LocalTool::new(|args| {
                let a = args.get("a").cloned().unwrap_or(Value::Null);
                let b = args.get("b").cloned().unwrap_or(Value::Null);
                arithmetic(&a, &b, i64::checked_add, |x, y| x + y)
            }),
        ),
        (
            ToolSchema::new("multiply", "Multiply a value by a factor")
                .required("value", ToolParameter::new(ParamType::Number).describe("Value"))
                .required("factor", ToolParameter::new(ParamType::Number).describe("Factor"))
                .returns("number"),
            LocalTool::new(|args| {
                let a = args.get("value").cloned().unwrap_or(Value::Null);
                let b = args.get("factor").cloned().unwrap_or(Value::Null);
                arithmetic(&a, &b, i64::checked_mul, |x, y| x * y)
            }),
        ),
        (
            ToolSchema::new("concat", "Join a list of values into one string")
                .required("items", ToolParameter::new(ParamType::Array).describe("Values to join"))
                .optional(
                    "separator",
                    ToolParameter::new(ParamType::String)
                        .describe("Separator placed between items")
                        .with_default(" "),
                )
                .returns("string"),
            LocalTool::new(|args| {
                let items = args
                    .get("items")
                    .and_then(Value::as_array)
                    .ok_or_else(|| anyhow!("argument 'items' must be an array"))?;
                let separator = args.get("separator").and_then(Value::as_str).unwrap_or(" ");
                let parts: Vec<String> = items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect();
                Ok(Value::String(parts.join(separator)))
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn builtin(name: &str) -> LocalTool {
        builtin_tools()
            .into_iter()
            .find(|(schema, _)| schema.name == name)
            .map(|(_, tool)| tool)
            .unwrap()
    }

    #[test]
    fn test_panics_become_errors() {
        let tool = LocalTool::new(|_| panic!("disk on fire"));
        let err = tool.call(&Map::new()).unwrap_err();
        assert_eq!(err.to_string(), "panicked: disk on fire");
    }

    #[test]
    fn test_builtin_arithmetic() {
        assert_eq!(builtin("add").call(&args(json!({"a": 2, "b": 3}))).unwrap(), json!(5));
        assert_eq!(builtin("add").call(&args(json!({"a": 0.5, "b": 1}))).unwrap(), json!(1.5));
        assert_eq!(
            builtin("multiply").call(&args(json!({"value": 10, "factor": 5}))).unwrap(),
            json!(50)
        );
        assert!(builtin("add").call(&args(json!({"a": "x", "b": 1}))).is_err());
    }

    #[test]
    fn test_builtin_concat() {
        let out = builtin("concat")
            .call(&args(json!({"items": ["a", 1, true], "separator": "-"})))
            .unwrap();
        assert_eq!(out, json!("a-1-true"));
    }
}
