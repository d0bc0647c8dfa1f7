//! Request and response types shared by the provider clients

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single completion request
///
/// Requests are stateless; each pipeline stage builds one from scratch with
/// the full context it needs. The model id is carried on the request because
/// one client can serve more than one tier (the Anthropic client handles
/// both the long-form and the finalizer model).
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model identifier to route to
    pub model: String,

    /// System prompt (role instructions)
    pub system: String,

    /// User message
    pub prompt: String,

    /// Completion budget; clients cap it at their configured maximum
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,
}

/// A finished free-text completion
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
    pub usage: TokenUsage,
}

/// A finished structured completion
#[derive(Debug, Clone)]
pub struct JsonCompletion {
    pub json: Value,
    pub usage: TokenUsage,
}

/// Token counts reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self { input_tokens, output_tokens }
    }

    /// Total tokens in both directions
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Sum with another usage (stages that run two concurrent calls log one
    /// merged entry)
    pub fn merge(&self, other: &TokenUsage) -> TokenUsage {
        TokenUsage::new(
            self.input_tokens + other.input_tokens,
            self.output_tokens + other.output_tokens,
        )
    }

    /// Price this usage in EUR at the model's published per-million rates
    ///
    /// Unknown models price at zero rather than failing the run.
    pub fn cost_eur(&self, model: &str) -> f64 {
        let (input_rate, output_rate) = eur_rates_per_million(model);
        (self.input_tokens as f64 * input_rate + self.output_tokens as f64 * output_rate)
            / 1_000_000.0
    }
}

/// EUR per one million tokens, (input, output)
fn eur_rates_per_million(model: &str) -> (f64, f64) {
    if model.starts_with("gpt-4o") {
        (2.50, 10.00)
    } else if model.contains("sonnet") {
        (3.00, 15.00)
    } else if model.contains("haiku") {
        (0.80, 4.00)
    } else {
        (0.0, 0.0)
    }
}
