//! Tool Catalog
//!
//! YAML declaration of remote and LLM tools, loaded by the CLI. Local tools
//! are code and are registered directly.
//!
//! ```yaml
//! tools:
//!   - name: fetch_quote
//!     description: Fetch a stock quote
//!     parameters:
//!       properties:
//!         symbol: { type: string }
//!       required: [symbol]
//!     remote:
//!       url: https://quotes.example.com/v1/quote
//!       method: GET
//!       auth: { type: api_key, key_env: QUOTES_KEY }
//!   - name: summarize
//!     description: Summarize text
//!     llm:
//!       operation: summarize
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::llm::{LlmOperation, LlmTool};
use super::registry::ToolRegistry;
use super::remote::{AuthScheme, HttpMethod, RemoteEndpoint, DEFAULT_API_KEY_HEADER};
use super::schema::ToolSchema;
use super::Tool;
use crate::llm::LLMProvider;
use crate::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolManifest {
    #[serde(default)]
    pub tools: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(flatten)]
    pub schema: ToolSchema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSpec {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub auth: AuthSpec,
}

/// Credentials may be inline or named by environment variable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthSpec {
    #[default]
    None,
    Bearer {
        #[serde(default)]
        token: Option<String>,
        #[serde(default)]
        token_env: Option<String>,
    },
    ApiKey {
        #[serde(default)]
        key: Option<String>,
        #[serde(default)]
        key_env: Option<String>,
        #[serde(default)]
        header: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSpec {
    pub operation: LlmOperation,
    #[serde(default)]
    pub model: Option<String>,
}

fn secret(inline: &Option<String>, env: &Option<String>, tool: &str) -> Result<String> {
    if let Some(value) = inline {
        return Ok(value.clone());
    }
    match env {
        Some(var) => std::env::var(var).map_err(|_| {
            Error::Config(format!(
                "tool '{}' reads its credential from ${}, which is not set",
                tool, var
            ))
        }),
        None => Err(Error::Config(format!("tool '{}' declares auth without a credential", tool))),
    }
}

impl AuthSpec {
    fn resolve(&self, tool: &str) -> Result<AuthScheme> {
        Ok(match self {
            AuthSpec::None => AuthScheme::None,
            AuthSpec::Bearer { token, token_env } => AuthScheme::bearer(secret(token, token_env, tool)?),
            AuthSpec::ApiKey {
                key,
                key_env,
                header,
            } => AuthScheme::ApiKey {
                key: secret(key, key_env, tool)?,
                header: header
                    .clone()
                    .unwrap_or_else(|| DEFAULT_API_KEY_HEADER.to_string()),
            },
        })
    }
}

impl RemoteSpec {
    fn build(&self, tool: &str) -> Result<RemoteEndpoint> {
        let mut endpoint = RemoteEndpoint::new(&self.url)?
            .with_method(self.method)
            .with_auth(self.auth.resolve(tool)?);
        if let Some(secs) = self.timeout_seconds {
            endpoint = endpoint.with_timeout(Duration::from_secs(secs));
        }
        for (name, value) in &self.headers {
            endpoint = endpoint.with_header(name, value);
        }
        Ok(endpoint)
    }
}

impl ToolManifest {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let manifest = Self::from_yaml_str(&text)?;
        info!("Loaded {} tool(s) from {}", manifest.tools.len(), path.display());
        Ok(manifest)
    }

    /// Registers every entry. LLM entries need `provider`; entries without
    /// a model use `default_model`.
    pub fn register_into(
        &self,
        registry: &mut ToolRegistry,
        provider: Option<Arc<dyn LLMProvider>>,
        default_model: &str,
    ) -> Result<usize> {
        for entry in &self.tools {
            let name = entry.schema.name.as_str();
            let (schema, tool) = match (&entry.remote, &entry.llm) {
                (Some(remote), None) => (entry.schema.clone(), Tool::Remote(remote.build(name)?)),
                (None, Some(llm)) => {
                    let provider = provider.clone().ok_or_else(|| {
                        Error::Config(format!("tool '{}' needs an LLM provider", name))
                    })?;
                    // Undeclared parameters fall back to the operation's own.
                    let schema = if entry.schema.parameters.properties.is_empty() {
                        llm.operation
                            .default_schema(name, &entry.schema.description)
                    } else {
                        entry.schema.clone()
                    };
                    let model = llm.model.as_deref().unwrap_or(default_model);
                    (schema, Tool::Llm(LlmTool::new(model, llm.operation, provider)))
                }
                _ => {
                    return Err(Error::Config(format!(
                        "tool '{}' must declare exactly one of 'remote' or 'llm'",
                        name
                    )))
                }
            };
            registry.register(schema, tool)?;
        }
        Ok(self.tools.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockProvider;
    use crate::tools::ToolKind;

    const CATALOG: &str = r#"
tools:
  - name: fetch_quote
    description: Fetch a stock quote
    parameters:
      properties:
        symbol: { type: string }
      required: [symbol]
    remote:
      url: https://quotes.example.com/v1/quote
      method: GET
      timeout_seconds: 10
      auth: { type: api_key, key: abc }
  - name: summarize
    description: Summarize text
    llm:
      operation: summarize
      model: small-model
"#;

    #[test]
    fn test_register_catalog() {
        let manifest = ToolManifest::from_yaml_str(CATALOG).unwrap();
        let mut registry = ToolRegistry::new();
        let count = manifest
            .register_into(&mut registry, Some(Arc::new(MockProvider::default())), "gpt-4")
            .unwrap();

        assert_eq!(count, 2);
        assert_eq!(registry.tool_type("fetch_quote"), Some(ToolKind::Remote));
        assert_eq!(registry.tool_type("summarize"), Some(ToolKind::Llm));
        let info = registry.remote_info("fetch_quote").unwrap();
        assert_eq!(info.method, HttpMethod::Get);
        assert_eq!(info.timeout, Duration::from_secs(10));
        assert!(registry.get_schema("summarize").unwrap().is_required("text"));
    }

    #[test]
    fn test_llm_tools_need_a_provider() {
        let manifest = ToolManifest::from_yaml_str(CATALOG).unwrap();
        let err = manifest
            .register_into(&mut ToolRegistry::new(), None, "gpt-4")
            .unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("summarize")));
    }

    #[test]
    fn test_entry_needs_exactly_one_backend() {
        let manifest = ToolManifest::from_yaml_str(
            "tools:\n  - name: orphan\n    description: nothing behind it\n",
        )
        .unwrap();
        let err = manifest
            .register_into(&mut ToolRegistry::new(), None, "gpt-4")
            .unwrap_err();
        assert!(err.to_string().contains("exactly one"));
    }

    #[test]
    fn test_missing_credential_env() {
        let manifest = ToolManifest::from_yaml_str(
            r#"
tools:
  - name: secure
    description: Needs a token
    remote:
      url: https://api.example.com/secure
      auth: { type: bearer, token_env: ASTRAFLOW_TEST_UNSET_TOKEN }
"#,
        )
        .unwrap();
        let err = manifest
            .register_into(&mut ToolRegistry::new(), None, "gpt-4")
            .unwrap_err();
        assert!(err.to_string().contains("ASTRAFLOW_TEST_UNSET_TOKEN"));
    }
}
