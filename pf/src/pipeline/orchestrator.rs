//! Pipeline orchestration
//!
//! Chains analyst, strategist, reviewer and finalizer over a pending plan,
//! then seals the row: completed status, total cost summed from the usage
//! log, completion timestamp. Failure anywhere lands in a single trap that
//! records the error through the guarded flip, so a plan that already
//! reached a terminal state is never overwritten.

use chrono::Utc;
use eyre::Result;
use planstore::{Plan, PlanPatch, PlanStatus};
use tracing::{error, info, warn};

use super::analyst::run_analyst;
use super::context::PipelineContext;
use super::finalizer::run_finalizer;
use super::reviewer::run_reviewer;
use super::strategist::run_strategist;

/// Drive a plan from `pending` to a terminal state
///
/// Only pending plans are run. A completed plan short-circuits with a
/// completion announcement so a reconnecting client settles immediately;
/// any other status means another worker owns the run and this call backs
/// off without touching it.
pub async fn run_pipeline(ctx: &PipelineContext, plan_id: &str) -> Result<()> {
    let plan = ctx.state.get_plan_required(plan_id).await?;
    match plan.status {
        PlanStatus::Pending => {}
        PlanStatus::Completed => {
            info!(plan_id, "Plan already completed");
            ctx.progress.emit(PlanStatus::Completed);
            return Ok(());
        }
        status => {
            warn!(plan_id, %status, "Plan is not pending, refusing to run");
            return Ok(());
        }
    }

    info!(plan_id, "Pipeline started");
    match generate(ctx, plan_id, &plan).await {
        Ok(()) => {
            ctx.progress.emit(PlanStatus::Completed);
            notify_completion(ctx, plan_id).await;
            Ok(())
        }
        Err(err) => {
            error!(plan_id, error = %err, "Pipeline failed");
            let message = format!("{:#}", err);
            match ctx.state.fail_if_in_flight(plan_id, &message).await {
                Ok(true) => ctx.progress.emit(PlanStatus::Failed),
                Ok(false) => warn!(plan_id, "Plan already terminal, leaving it untouched"),
                Err(state_err) => {
                    error!(plan_id, error = %state_err, "Could not record the failure")
                }
            }
            Err(err)
        }
    }
}

async fn generate(ctx: &PipelineContext, plan_id: &str, plan: &Plan) -> Result<()> {
    let questionnaire = &plan.questionnaire;

    let brief = run_analyst(ctx, plan_id, questionnaire).await?;
    let draft = run_strategist(ctx, plan_id, questionnaire, &brief).await?;
    let review = run_reviewer(ctx, plan_id, questionnaire, &brief, &draft).await?;
    let document = run_finalizer(ctx, plan_id, &draft, &review).await?;

    let total_cost = ctx.state.total_cost(plan_id).await?;
    ctx.state
        .apply_patch(
            plan_id,
            PlanPatch::new()
                .with_status(PlanStatus::Completed)
                .with_total_cost(total_cost)
                .with_final_document(document)
                .with_completed_at(Utc::now()),
        )
        .await?;
    info!(plan_id, cost_eur = total_cost, "Pipeline completed");
    Ok(())
}

/// Best-effort completion email; never affects the plan state
async fn notify_completion(ctx: &PipelineContext, plan_id: &str) {
    let Some(notifier) = &ctx.notifier else {
        return;
    };
    let plan = match ctx.state.get_plan(plan_id).await {
        Ok(Some(plan)) => plan,
        Ok(None) => return,
        Err(err) => {
            warn!(plan_id, error = %err, "Could not load plan for notification");
            return;
        }
    };
    if let Err(err) = notifier.plan_completed(&plan).await {
        warn!(plan_id, error = %err, "Completion notification failed");
    }
}
