//! Model client module
//!
//! Two provider clients behind two capability traits: a structured client
//! that enforces JSON replies, and a free-text client for long-form
//! generation (which also serves as the JSON fallback path).

use std::sync::Arc;

mod anthropic;
pub mod client;
mod error;
pub mod extract;
mod openai;
mod types;

pub use anthropic::AnthropicClient;
pub use client::{LlmClient, StructuredLlmClient};
pub use error::LlmError;
pub use extract::extract_json_object;
pub use openai::OpenAIClient;
pub use types::{CompletionRequest, CompletionResponse, JsonCompletion, TokenUsage};

use crate::config::LlmConfig;

/// Create the provider clients from configuration
///
/// Both constructors resolve their API keys up front, so a missing key is
/// a startup error rather than a mid-pipeline surprise.
pub fn create_clients(
    config: &LlmConfig,
) -> Result<(Arc<dyn StructuredLlmClient>, Arc<dyn LlmClient>), LlmError> {
    let json_client: Arc<dyn StructuredLlmClient> =
        Arc::new(OpenAIClient::from_config(&config.openai)?);
    let text_client: Arc<dyn LlmClient> = Arc::new(AnthropicClient::from_config(&config.anthropic)?);
    Ok((json_client, text_client))
}
