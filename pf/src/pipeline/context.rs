//! Shared wiring handed to every stage

use std::sync::Arc;

use crate::config::LlmConfig;
use crate::llm::{LlmClient, StructuredLlmClient};
use crate::notify::Notifier;
use crate::progress::ProgressSender;
use crate::prompts::PromptLoader;
use crate::state::StateManager;

/// Model selection for the three call shapes the pipeline makes
#[derive(Debug, Clone)]
pub struct ModelTiers {
    /// Model for the JSON stages (analyst, reviewer)
    pub json_model: String,
    /// Token cap for JSON stages and their fallback calls
    pub json_max_tokens: u32,
    /// Model for long-form generation (strategist) and JSON fallbacks
    pub longform_model: String,
    /// Token cap per strategist part
    pub longform_max_tokens: u32,
    /// Model for the finalizer parts
    pub finalizer_model: String,
    /// Token cap per finalizer part
    pub finalizer_max_tokens: u32,
}

impl ModelTiers {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            json_model: config.openai.model.clone(),
            json_max_tokens: config.openai.max_tokens,
            longform_model: config.anthropic.model.clone(),
            longform_max_tokens: config.anthropic.max_tokens,
            finalizer_model: config.anthropic.finalizer_model.clone(),
            finalizer_max_tokens: config.anthropic.finalizer_max_tokens,
        }
    }
}

/// Everything a pipeline run needs
///
/// Cheap to clone. Each stream that drives a run builds one carrying its own
/// progress sender.
#[derive(Clone)]
pub struct PipelineContext {
    /// Persistence handle
    pub state: StateManager,
    /// Provider with native JSON output, used by analyst and reviewer
    pub json_client: Arc<dyn StructuredLlmClient>,
    /// Long-form provider, used by strategist, finalizer and fallbacks
    pub text_client: Arc<dyn LlmClient>,
    /// Role prompts and user-message rendering
    pub prompts: Arc<PromptLoader>,
    /// Model ids and token caps per call shape
    pub tiers: ModelTiers,
    /// Live status transitions for the driving stream
    pub progress: ProgressSender,
    /// Completion notifier, when configured
    pub notifier: Option<Arc<dyn Notifier>>,
}
