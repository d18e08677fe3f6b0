//! Tool Registry
//!
//! Name -> tool mapping. `invoke` is the single dispatch point for every
//! tool kind; it checks arguments against the schema before any side effect.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info};

use super::local::LocalTool;
use super::remote::HttpMethod;
use super::schema::ToolSchema;
use super::{Tool, ToolKind};
use crate::{Error, Result};

#[derive(Debug, Clone)]
struct RegisteredTool {
    schema: ToolSchema,
    tool: Tool,
}

/// Where a remote tool sends its requests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteInfo {
    pub url: String,
    pub method: HttpMethod,
    #[serde(with = "secs_f64")]
    pub timeout: Duration,
}

mod secs_f64 {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }
}

#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: IndexMap<String, RegisteredTool>,
    http: reqwest::Client,
    validate_parameters: bool,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: IndexMap::new(),
            http: reqwest::Client::new(),
            validate_parameters: true,
        }
    }

    /// Toggles schema validation in [`invoke`](Self::invoke).
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validate_parameters = enabled;
        self
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    pub fn validates_parameters(&self) -> bool {
        self.validate_parameters
    }

    /// Adds a tool under `schema.name`. Names are case-sensitive and unique.
    pub fn register(&mut self, schema: ToolSchema, tool: Tool) -> Result<()> {
        if self.tools.contains_key(&schema.name) {
            return Err(Error::DuplicateTool(schema.name));
        }
        info!("Registered {} tool '{}'", tool.kind(), schema.name);
        self.tools
            .insert(schema.name.clone(), RegisteredTool { schema, tool });
        Ok(())
    }

    pub fn register_local<F>(&mut self, schema: ToolSchema, func: F) -> Result<()>
    where
        F: Fn(&Map<String, Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.register(schema, Tool::Local(LocalTool::new(func)))
    }

    pub fn get_schema(&self, name: &str) -> Option<&ToolSchema> {
        self.tools.get(name).map(|t| &t.schema)
    }

    /// All schemas in registration order.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.schema.clone()).collect()
    }

    pub fn list_tools(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_type(&self, name: &str) -> Option<ToolKind> {
        self.tools.get(name).map(|t| t.tool.kind())
    }

    pub fn remote_info(&self, name: &str) -> Option<RemoteInfo> {
        match self.tools.get(name).map(|t| &t.tool) {
            Some(Tool::Remote(endpoint)) => Some(RemoteInfo {
                url: endpoint.url().to_string(),
                method: endpoint.method(),
                timeout: endpoint.timeout(),
            }),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Looks up `name`, fills schema defaults, validates, then dispatches
    /// on the tool kind. Errors other than `ToolExecution` are raised before
    /// the tool is touched.
    pub async fn invoke(&self, name: &str, mut arguments: Map<String, Value>) -> Result<Value> {
        let registered = self
            .tools
            .get(name)
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))?;

        registered.schema.apply_defaults(&mut arguments);
        if self.validate_parameters {
            registered
                .schema
                .validate_arguments(&arguments)
                .map_err(|message| Error::validation(name, message))?;
        }

        debug!("Invoking {} tool '{}'", registered.tool.kind(), name);
        match &registered.tool {
            Tool::Local(local) => local
                .call(&arguments)
                .map_err(|e| Error::execution(name, format!("{:#}", e))),
            Tool::Remote(endpoint) => endpoint.call(&self.http, name, &arguments).await,
            Tool::Llm(llm) => llm.call(name, &arguments).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::remote::RemoteEndpoint;
    use crate::tools::schema::{ParamType, ToolParameter};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn add_schema() -> ToolSchema {
        ToolSchema::new("add", "Add two numbers")
            .required("a", ToolParameter::new(ParamType::Number))
            .required("b", ToolParameter::new(ParamType::Number))
    }

    #[tokio::test]
    async fn test_register_and_invoke_local() {
        let mut registry = ToolRegistry::new();
        registry
            .register_local(add_schema(), |args| {
                let a = args["a"].as_f64().unwrap_or_default();
                let b = args["b"].as_f64().unwrap_or_default();
                Ok(json!(a + b))
            })
            .unwrap();

        assert!(registry.has_tool("add"));
        assert!(!registry.has_tool("Add"));
        assert_eq!(registry.tool_type("add"), Some(ToolKind::Local));
        let out = registry.invoke("add", args(json!({"a": 2, "b": 3}))).await.unwrap();
        assert_eq!(out, json!(5.0));
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = ToolRegistry::new();
        registry.register_local(add_schema(), |_| Ok(Value::Null)).unwrap();
        let err = registry
            .register_local(add_schema(), |_| Ok(Value::Null))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateTool(name) if name == "add"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.invoke("missing", Map::new()).await.unwrap_err();
        assert!(matches!(err, Error::ToolNotFound(name) if name == "missing"));
    }

    #[tokio::test]
    async fn test_validation_runs_before_the_tool() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut registry = ToolRegistry::new();
        registry
            .register_local(add_schema(), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            })
            .unwrap();

        let err = registry.invoke("add", args(json!({"a": 1}))).await.unwrap_err();
        assert!(matches!(err, Error::ParameterValidation { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let lenient = registry.clone().with_validation(false);
        assert!(lenient.invoke("add", args(json!({"a": 1}))).await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_callable_errors_are_execution_errors() {
        let mut registry = ToolRegistry::new();
        registry
            .register_local(ToolSchema::new("fail", "Always fails"), |_| {
                Err(anyhow::anyhow!("disk full"))
            })
            .unwrap();
        let err = registry.invoke("fail", Map::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "Tool 'fail' execution failed: disk full");
    }

    #[test]
    fn test_schemas_keep_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry
                .register_local(ToolSchema::new(name, "noop"), |_| Ok(Value::Null))
                .unwrap();
        }
        registry
            .register(
                ToolSchema::new("fetch", "Fetch a page"),
                Tool::Remote(RemoteEndpoint::new("https://example.com/fetch").unwrap()),
            )
            .unwrap();

        assert_eq!(registry.list_tools(), vec!["zeta", "alpha", "mid", "fetch"]);
        let info = registry.remote_info("fetch").unwrap();
        assert_eq!(info.url, "https://example.com/fetch");
        assert_eq!(info.method, HttpMethod::Post);
        assert!(registry.remote_info("zeta").is_none());
    }
}
