//! Strategist stage - drafts the ten-section plan
//!
//! The draft is produced in two halves requested concurrently: sections 1-5
//! and sections 6-10. Both go to the long-form provider with the same
//! questionnaire and brief but part-specific role prompts. The halves are
//! joined in part order regardless of which reply lands first, and the whole
//! stage is accounted as a single usage entry.
//!
//! There is no fallback here. Markdown needs no JSON coercion, and a failed
//! half fails the run.

use std::time::Instant;

use eyre::Result;
use planstore::{PlanPatch, PlanStatus, UsageLogEntry};
use serde_json::Value;
use tracing::info;

use crate::llm::{CompletionRequest, CompletionResponse};
use crate::prompts::PlanPart;

use super::context::PipelineContext;

/// Pipeline stage number for usage attribution
const STAGE: u8 = 3;

/// Sampling temperature; drafting wants some room to write
const TEMPERATURE: f32 = 0.5;

/// Run the strategist stage and return the draft markdown
///
/// The draft lives only in the pipeline; it is superseded by the finalizer's
/// document and is never persisted on the plan.
pub async fn run_strategist(
    ctx: &PipelineContext,
    plan_id: &str,
    questionnaire: &Value,
    brief: &Value,
) -> Result<String> {
    ctx.state
        .apply_patch(plan_id, PlanPatch::new().with_status(PlanStatus::Generating))
        .await?;
    ctx.progress.emit(PlanStatus::Generating);
    info!(plan_id, "Strategist stage started");

    let start = Instant::now();
    let (first, second) = tokio::try_join!(
        request_part(ctx, PlanPart::First, questionnaire, brief),
        request_part(ctx, PlanPart::Second, questionnaire, brief),
    )?;

    let usage = first.usage.merge(&second.usage);
    let entry = UsageLogEntry::new(plan_id, STAGE, &ctx.tiers.longform_model)
        .with_tokens(usage.input_tokens, usage.output_tokens)
        .with_cost(usage.cost_eur(&ctx.tiers.longform_model))
        .with_duration_ms(start.elapsed().as_millis() as u64);
    ctx.state.append_usage(entry).await?;

    info!(
        plan_id,
        tokens = usage.total(),
        "Strategist stage finished"
    );
    Ok(format!("{}\n\n{}", first.text, second.text))
}

async fn request_part(
    ctx: &PipelineContext,
    part: PlanPart,
    questionnaire: &Value,
    brief: &Value,
) -> Result<CompletionResponse> {
    let system = ctx.prompts.strategist_system(part)?;
    let prompt = ctx.prompts.strategist_user(part, questionnaire, brief)?;
    let response = ctx
        .text_client
        .complete(CompletionRequest {
            model: ctx.tiers.longform_model.clone(),
            system,
            prompt,
            max_tokens: ctx.tiers.longform_max_tokens,
            temperature: TEMPERATURE,
        })
        .await?;
    Ok(response)
}
