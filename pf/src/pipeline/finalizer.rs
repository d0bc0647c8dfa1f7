//! Finalizer stage - folds the review back into a polished document
//!
//! Two concurrent calls on the finalizer model, one per document half,
//! joined in part order. The result is persisted on the plan while the
//! status is still `finalising`, so a crash after this point leaves a
//! recoverable plan: the document is there and only the completion patch
//! is missing.

use std::time::Instant;

use eyre::Result;
use planstore::{PlanPatch, PlanStatus, UsageLogEntry};
use serde_json::Value;
use tracing::info;

use crate::llm::{CompletionRequest, CompletionResponse};
use crate::prompts::PlanPart;

use super::context::PipelineContext;

/// Pipeline stage number for usage attribution
const STAGE: u8 = 5;

/// Sampling temperature; polishing should not rewrite freely
const TEMPERATURE: f32 = 0.3;

/// Run the finalizer stage and return the final markdown
pub async fn run_finalizer(
    ctx: &PipelineContext,
    plan_id: &str,
    draft: &str,
    review: &Value,
) -> Result<String> {
    ctx.state
        .apply_patch(plan_id, PlanPatch::new().with_status(PlanStatus::Finalising))
        .await?;
    ctx.progress.emit(PlanStatus::Finalising);
    info!(plan_id, "Finalizer stage started");

    let start = Instant::now();
    let (first, second) = tokio::try_join!(
        request_part(ctx, PlanPart::First, draft, review),
        request_part(ctx, PlanPart::Second, draft, review),
    )?;

    let usage = first.usage.merge(&second.usage);
    let entry = UsageLogEntry::new(plan_id, STAGE, &ctx.tiers.finalizer_model)
        .with_tokens(usage.input_tokens, usage.output_tokens)
        .with_cost(usage.cost_eur(&ctx.tiers.finalizer_model))
        .with_duration_ms(start.elapsed().as_millis() as u64);
    ctx.state.append_usage(entry).await?;

    let document = format!("{}\n\n{}", first.text, second.text);
    ctx.state
        .apply_patch(
            plan_id,
            PlanPatch::new().with_final_document(document.clone()),
        )
        .await?;
    info!(plan_id, "Finalizer stage finished");
    Ok(document)
}

async fn request_part(
    ctx: &PipelineContext,
    part: PlanPart,
    draft: &str,
    review: &Value,
) -> Result<CompletionResponse> {
    let system = ctx.prompts.finalizer_system(part)?;
    let prompt = ctx.prompts.finalizer_user(part, draft, review)?;
    let response = ctx
        .text_client
        .complete(CompletionRequest {
            model: ctx.tiers.finalizer_model.clone(),
            system,
            prompt,
            max_tokens: ctx.tiers.finalizer_max_tokens,
            temperature: TEMPERATURE,
        })
        .await?;
    Ok(response)
}
