pub mod parse;
pub mod provider;

pub use parse::parse_json_from_llm_response;
pub use provider::{create_provider, LLMConfig, LLMProvider, MockProvider};
