//! Analyst stage - sector and competition research
//!
//! The primary call goes to the JSON provider. Any failure there, including
//! a payload that does not validate, is retried once on the long-form
//! provider with a JSON-only directive appended to the role prompt and
//! balanced-brace extraction applied to the reply.

use std::time::Instant;

use eyre::{Result, eyre};
use planstore::{PlanPatch, PlanStatus, UsageLogEntry};
use serde_json::Value;
use tracing::{info, warn};

use crate::llm::{CompletionRequest, TokenUsage, extract_json_object};
use crate::prompts::JSON_ONLY_SUFFIX;

use super::context::PipelineContext;
use super::types::AnalystBrief;

/// Pipeline stage number for usage attribution
const STAGE: u8 = 2;

/// Sampling temperature; research output should stay close to the data
const TEMPERATURE: f32 = 0.3;

/// Run the analyst stage and return the normalized brief
pub async fn run_analyst(
    ctx: &PipelineContext,
    plan_id: &str,
    questionnaire: &Value,
) -> Result<Value> {
    ctx.state
        .apply_patch(plan_id, PlanPatch::new().with_status(PlanStatus::Analysing))
        .await?;
    ctx.progress.emit(PlanStatus::Analysing);
    info!(plan_id, "Analyst stage started");

    let system = ctx.prompts.analyst_system()?;
    let user = ctx.prompts.analyst_user(questionnaire)?;

    let brief = match attempt_primary(ctx, &system, &user).await {
        Ok((brief, usage, duration_ms)) => {
            let entry = UsageLogEntry::new(plan_id, STAGE, &ctx.tiers.json_model)
                .with_tokens(usage.input_tokens, usage.output_tokens)
                .with_cost(usage.cost_eur(&ctx.tiers.json_model))
                .with_duration_ms(duration_ms);
            ctx.state.append_usage(entry).await?;
            brief
        }
        Err(err) => {
            warn!(plan_id, error = %err, "Analyst primary call failed, using fallback");
            run_fallback(ctx, plan_id, &system, &user).await?
        }
    };

    ctx.state
        .apply_patch(plan_id, PlanPatch::new().with_analyst_brief(brief.clone()))
        .await?;
    info!(plan_id, "Analyst stage finished");
    Ok(brief)
}

/// One call against the JSON provider; no bookkeeping so a failure here
/// costs nothing but the call itself
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
    let brief = AnalystBrief::normalize(completion.json)?;
    Ok((brief, completion.usage, start.elapsed().as_millis() as u64))
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
    let brief = AnalystBrief::normalize(serde_json::from_str(raw)?)?;

    let entry = UsageLogEntry::new(plan_id, STAGE, &ctx.tiers.longform_model)
        .with_tokens(response.usage.input_tokens, response.usage.output_tokens)
        .with_cost(response.usage.cost_eur(&ctx.tiers.longform_model))
        .with_duration_ms(start.elapsed().as_millis() as u64)
        .with_fallback(true);
    ctx.state.append_usage(entry).await?;
    Ok(brief)
}
