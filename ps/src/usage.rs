//! Usage log domain type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One priced model call attributed to a plan
///
/// Stages that run two concurrent calls log a single merged entry with the
/// token counts summed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageLogEntry {
    /// Row id (0 until stored)
    #[serde(default)]
    pub id: i64,

    /// Owning plan
    pub plan_id: String,

    /// Pipeline stage number (2 analyst, 3 strategist, 4 reviewer, 5 finalizer)
    pub stage: u8,

    /// Model identifier as sent to the provider
    pub model: String,

    /// Prompt tokens consumed
    pub input_tokens: u64,

    /// Completion tokens produced
    pub output_tokens: u64,

    /// Cost in EUR at the model's published rates
    pub cost: f64,

    /// Wall-clock duration of the call in milliseconds
    pub duration_ms: u64,

    /// True when the call went through the fallback provider path
    pub fallback: bool,

    /// When the call finished
    pub created_at: DateTime<Utc>,
}

impl UsageLogEntry {
    /// Create an entry with zeroed metrics
    pub fn new(plan_id: impl Into<String>, stage: u8, model: impl Into<String>) -> Self {
        Self {
            id: 0,
            plan_id: plan_id.into(),
            stage,
            model: model.into(),
            input_tokens: 0,
            output_tokens: 0,
            cost: 0.0,
            duration_ms: 0,
            fallback: false,
            created_at: Utc::now(),
        }
    }

    /// Builder method to set token counts
    pub fn with_tokens(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
        self
    }

    /// Builder method to set the cost
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    /// Builder method to set the call duration
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Builder method to mark the fallback path
    pub fn with_fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }

    /// Total tokens in both directions
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_entry_new() {
        let entry = UsageLogEntry::new("plan-1", 2, "gpt-4o");
        assert_eq!(entry.id, 0);
        assert_eq!(entry.plan_id, "plan-1");
        assert_eq!(entry.stage, 2);
        assert_eq!(entry.model, "gpt-4o");
        assert_eq!(entry.total_tokens(), 0);
        assert!(!entry.fallback);
    }

    #[test]
    fn test_usage_entry_builder() {
        let entry = UsageLogEntry::new("plan-1", 3, "claude-sonnet-4-5-20250929")
            .with_tokens(1200, 3400)
            .with_cost(0.0546)
            .with_duration_ms(18_000)
            .with_fallback(true);
        assert_eq!(entry.input_tokens, 1200);
        assert_eq!(entry.output_tokens, 3400);
        assert_eq!(entry.total_tokens(), 4600);
        assert!((entry.cost - 0.0546).abs() < 1e-9);
        assert_eq!(entry.duration_ms, 18_000);
        assert!(entry.fallback);
    }
}
