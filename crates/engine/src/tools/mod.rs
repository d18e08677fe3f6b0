//! Tools Module
//!
//! The three kinds of executable capability a workflow step can name, and
//! the registry that owns them.

pub mod llm;
pub mod local;
pub mod manifest;
pub mod registry;
pub mod remote;
pub mod schema;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use llm::{LlmOperation, LlmTool};
pub use local::{builtin_tools, LocalTool};
pub use manifest::ToolManifest;
pub use registry::{RemoteInfo, ToolRegistry};
pub use remote::{AuthScheme, HttpMethod, RemoteEndpoint};
pub use schema::{ParamType, ToolParameter, ToolSchema};

/// A registered tool. Dispatch happens in one place,
/// [`ToolRegistry::invoke`].
#[derive(Debug, Clone)]
pub enum Tool {
    Local(LocalTool),
    Remote(RemoteEndpoint),
    Llm(LlmTool),
}

impl Tool {
    pub fn kind(&self) -> ToolKind {
        match self {
            Tool::Local(_) => ToolKind::Local,
            Tool::Remote(_) => ToolKind::Remote,
            Tool::Llm(_) => ToolKind::Llm,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Local,
    Remote,
    Llm,
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolKind::Local => write!(f, "local"),
            ToolKind::Remote => write!(f, "remote"),
            ToolKind::Llm => write!(f, "llm"),
        }
    }
}
