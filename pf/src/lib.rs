//! Planforge - marketing plan generation service
//!
//! Turns a business questionnaire into a reviewed, ten-section marketing
//! plan through a four-stage LLM pipeline: an analyst builds a market
//! brief, a strategist drafts the plan in two halves, a reviewer grades
//! the draft and a finalizer rewrites it with the review applied. Plans,
//! stage outputs and per-call token usage persist through the `planstore`
//! crate; progress streams to clients over SSE.
//!
//! # Modules
//!
//! - [`llm`] - Provider clients behind the completion traits
//! - [`prompts`] - Prompt templates and rendering
//! - [`pipeline`] - The four-stage generation pipeline
//! - [`state`] - Actor that owns the plan store
//! - [`progress`] - Stage updates and client-facing status messages
//! - [`server`] - HTTP API and SSE streaming
//! - [`notify`] - Completion email
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod llm;
pub mod notify;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod server;
pub mod state;

// Re-export commonly used types
pub use config::{Config, LlmConfig};
pub use llm::{
    AnthropicClient, CompletionRequest, CompletionResponse, LlmClient, LlmError, OpenAIClient,
    StructuredLlmClient, TokenUsage, create_clients,
};
pub use notify::{EmailNotifier, Notifier};
pub use pipeline::{ModelTiers, PipelineContext, run_pipeline};
pub use progress::{ProgressSender, StatusMessage, progress_channel, status_message};
pub use prompts::{PlanPart, PromptLoader};
pub use server::AppState;
pub use state::{StateError, StateManager};
