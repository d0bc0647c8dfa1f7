//! Reviewer stage - critiques the draft before finalization
//!
//! Same call discipline as the analyst: primary on the JSON provider, one
//! fallback on the long-form provider with a JSON-only directive and
//! balanced-brace extraction.

use std::time::Instant;

use eyre::{Result, eyre};
use planstore::{PlanPatch, PlanStatus, UsageLogEntry};
use serde_json::Value;
use tracing::{info, warn};

use crate::llm::{CompletionRequest, TokenUsage, extract_json_object};
use crate::prompts::JSON_ONLY_SUFFIX;

use super::context::PipelineContext;
use super::types::ReviewOutput;

/// Pipeline stage number for usage attribution
const STAGE: u8 = 4;

/// Sampling temperature for the critique
const TEMPERATURE: f32 = 0.4;

/// Run the reviewer stage and return the normalized review
pub async fn run_reviewer(
    ctx: &PipelineContext,
    plan_id: &str,
    questionnaire: &Value,
    brief: &Value,
    draft: &str,
) -> Result<Value> {
    ctx.state
        .apply_patch(plan_id, PlanPatch::new().with_status(PlanStatus::Reviewing))
        .await?;
    ctx.progress.emit(PlanStatus::Reviewing);
    info!(plan_id, "Reviewer stage started");

    let system = ctx.prompts.reviewer_system()?;
    let user = ctx.prompts.reviewer_user(questionnaire, brief, draft)?;

    let review = match attempt_primary(ctx, &system, &user).await {
        Ok((review, usage, duration_ms)) => {
            let entry = UsageLogEntry::new(plan_id, STAGE, &ctx.tiers.json_model)
                .with_tokens(usage.input_tokens, usage.output_tokens)
                .with_cost(usage.cost_eur(&ctx.tiers.json_model))
                .with_duration_ms(duration_ms);
            ctx.state.append_usage(entry).await?;
            review
        }
        Err(err) => {
            warn!(plan_id, error = %err, "Reviewer primary call failed, using fallback");
            run_fallback(ctx, plan_id, &system, &user).await?
        }
    };

    ctx.state
        .apply_patch(plan_id, PlanPatch::new().with_review(review.clone()))
        .await?;
    info!(plan_id, "Reviewer stage finished");
    Ok(review)
}

async fn attempt_primary(
    ctx: &PipelineContext,
    system: &str,
    user: &str,
) -> Result<(Value, TokenUsage, u64)> {
    let start = Instant::now();
    let completion = ctx
        .json_client
        .complete_json(CompletionRequest {
            model: ctx.tiers.json_model.clone(),
            system: system.to_string(),
            prompt: user.to_string(),
            max_tokens: ctx.tiers.json_max_tokens,
            temperature: TEMPERATURE,
        })
        .await?;
    let review = ReviewOutput::normalize(completion.json)?;
    Ok((review, completion.usage, start.elapsed().as_millis() as u64))
}

async fn run_fallback(
    ctx: &PipelineContext,
    plan_id: &str,
    system: &str,
    user: &str,
) -> Result<Value> {
    let start = Instant::now();
    let response = ctx
        .text_client
        .complete(CompletionRequest {
            model: ctx.tiers.longform_model.clone(),
            system: format!("{}{}", system, JSON_ONLY_SUFFIX),
            prompt: user.to_string(),
            max_tokens: ctx.tiers.json_max_tokens,
            temperature: TEMPERATURE,
        })
        .await?;
    let raw = extract_json_object(&response.text)
        .ok_or_else(|| eyre!("fallback reply contains no JSON object"))?;
    let review = ReviewOutput::normalize(serde_json::from_str(raw)?)?;

    let entry = UsageLogEntry::new(plan_id, STAGE, &ctx.tiers.longform_model)
        .with_tokens(response.usage.input_tokens, response.usage.output_tokens)
        .with_cost(response.usage.cost_eur(&ctx.tiers.longform_model))
        .with_duration_ms(start.elapsed().as_millis() as u64)
        .with_fallback(true);
    ctx.state.append_usage(entry).await?;
    Ok(review)
}
