//! Remote Endpoint Tools
//!
//! Tools backed by an HTTP API. Arguments travel as a JSON body (POST) or
//! as query parameters (GET); the response body is returned as-is.

use indexmap::IndexMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::{Error, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
        }
    }
}

/// How the request authenticates.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum AuthScheme {
    #[default]
    None,
    /// `Authorization: Bearer <token>`
    Bearer { token: String },
    /// `<header>: <key>`, `X-API-Key` unless overridden.
    ApiKey { key: String, header: String },
}

impl AuthScheme {
    pub fn bearer(token: impl Into<String>) -> Self {
        AuthScheme::Bearer {
            token: token.into(),
        }
    }

    pub fn api_key(key: impl Into<String>) -> Self {
        AuthScheme::ApiKey {
            key: key.into(),
            header: DEFAULT_API_KEY_HEADER.to_string(),
        }
    }
}

// Keep secrets out of logs.
impl fmt::Debug for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthScheme::None => write!(f, "None"),
            AuthScheme::Bearer { .. } => write!(f, "Bearer(***)"),
            AuthScheme::ApiKey { header, .. } => write!(f, "ApiKey({}: ***)", header),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteEndpoint {
    url: Url,
    method: HttpMethod,
    headers: IndexMap<String, String>,
    timeout: Duration,
    auth: AuthScheme,
}

impl RemoteEndpoint {
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| Error::Config(format!("invalid endpoint URL '{}': {}", url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "endpoint URL '{}' must use http or https",
                url
            )));
        }
        Ok(Self {
            url,
            method: HttpMethod::default(),
            headers: IndexMap::new(),
            timeout: DEFAULT_TIMEOUT,
            auth: AuthScheme::None,
        })
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_auth(mut self, auth: AuthScheme) -> Self {
        self.auth = auth;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends one request. Transport failures, timeouts, and non-2xx statuses
    /// all surface as tool execution errors.
    pub async fn call(&self, client: &Client, tool: &str, arguments: &Map<String, Value>) -> Result<Value> {
        let mut request = match self.method {
            HttpMethod::Get => client.get(self.url.clone()).query(&query_pairs(arguments)),
            HttpMethod::Post => client.post(self.url.clone()).json(arguments),
        }
        .timeout(self.timeout);

        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request = match &self.auth {
            AuthScheme::None => request,
            AuthScheme::Bearer { token } => request.bearer_auth(token),
            AuthScheme::ApiKey { key, header } => request.header(header.as_str(), key.as_str()),
        };

        debug!("{} {} (timeout {:?})", self.method, self.url, self.timeout);
        let response = request.send().await.map_err(|e| self.transport_error(tool, e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(tool, e))?;

        if !status.is_success() {
            return Err(Error::execution(
                tool,
                format!("API error: {} - {}", status.as_u16(), truncate(&body, 500)),
            ));
        }

        Ok(parse_body(&body))
    }

    fn transport_error(&self, tool: &str, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::execution(
                tool,
                format!("API call timed out after {}s", self.timeout.as_secs_f64()),
            )
        } else {
            Error::execution(tool, format!("API call failed: {}", err))
        }
    }
}

/// Flattens arguments into query pairs: strings verbatim, other values as
/// compact JSON.
pub fn query_pairs(arguments: &Map<String, Value>) -> Vec<(String, String)> {
    arguments
        .iter()
        .map(|(name, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (name.clone(), text)
        })
        .collect()
}

fn parse_body(body: &str) -> Value {
    if body.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
