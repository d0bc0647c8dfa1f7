//! Client trait definitions

use async_trait::async_trait;

use super::{CompletionRequest, CompletionResponse, JsonCompletion, LlmError};

/// Stateless free-text completion client
///
/// Each call is independent; no conversation state is kept between calls.
/// The pipeline builds every request with the full context the stage needs.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a single completion request and wait for the full reply
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

/// Client that can be held to structured JSON output
///
/// Implementations enforce JSON at the provider level where possible; the
/// reply is parsed before it is returned, so callers never see raw text.
#[async_trait]
pub trait StructuredLlmClient: Send + Sync {
    /// Send a completion request whose reply must be a single JSON object
    async fn complete_json(&self, request: CompletionRequest) -> Result<JsonCompletion, LlmError>;
}
