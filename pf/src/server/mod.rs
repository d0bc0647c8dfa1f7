//! HTTP surface
//!
//! Three routes: create a plan, stream its progress over SSE, and fetch the
//! finished document. Handlers stay thin; the pipeline and the state actor
//! do the work.

pub mod stream;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use eyre::Result;
use planstore::{Contact, Plan, PlanStatus};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::StreamConfig;
use crate::llm::{LlmClient, StructuredLlmClient};
use crate::notify::Notifier;
use crate::pipeline::{ModelTiers, PipelineContext};
use crate::progress::ProgressSender;
use crate::prompts::PromptLoader;
use crate::state::StateManager;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub state: StateManager,
    pub json_client: Arc<dyn StructuredLlmClient>,
    pub text_client: Arc<dyn LlmClient>,
    pub prompts: Arc<PromptLoader>,
    pub tiers: ModelTiers,
    pub notifier: Option<Arc<dyn Notifier>>,
    pub stream: StreamConfig,
}

impl AppState {
    /// Pipeline wiring for one run, carrying the run's progress sender
    pub fn pipeline_context(&self, progress: ProgressSender) -> PipelineContext {
        PipelineContext {
            state: self.state.clone(),
            json_client: self.json_client.clone(),
            text_client: self.text_client.clone(),
            prompts: self.prompts.clone(),
            tiers: self.tiers.clone(),
            progress,
            notifier: self.notifier.clone(),
        }
    }
}

/// Build the application router
pub fn router(app: AppState) -> Router {
    Router::new()
        .route("/api/plans", post(create_plan))
        .route("/api/stream/:plan_id", get(stream::stream_plan))
        .route("/api/plans/:plan_id/document", get(get_document))
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}

/// Run the HTTP server until a shutdown signal arrives
pub async fn serve(bind: &str, app: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(app))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Could not listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Request body for plan creation
#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    /// Questionnaire answers; must be a non-empty JSON object
    #[serde(default)]
    pub questionnaire: Option<Value>,

    /// Optional contact for the completion email
    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub name: Option<String>,
}

async fn create_plan(
    State(app): State<AppState>,
    Json(request): Json<CreatePlanRequest>,
) -> Response {
    let questionnaire = match request.questionnaire {
        Some(value) if value.as_object().is_some_and(|answers| !answers.is_empty()) => value,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "O questionário é obrigatório."})),
            )
                .into_response();
        }
    };

    let mut plan = Plan::new(questionnaire);
    if let Some(email) = request.email.filter(|email| !email.is_empty()) {
        plan = plan.with_contact(Contact::new(email, request.name));
    }

    match app.state.create_plan(plan).await {
        Ok(plan_id) => {
            info!(plan_id = %plan_id, "Plan created");
            Json(json!({
                "plan_id": plan_id,
                "stream_url": format!("/api/stream/{}", plan_id),
            }))
            .into_response()
        }
        Err(err) => {
            error!(error = %err, "Plan creation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Não foi possível criar o plano."})),
            )
                .into_response()
        }
    }
}

async fn get_document(State(app): State<AppState>, Path(plan_id): Path<String>) -> Response {
    match app.state.get_plan(&plan_id).await {
        Ok(Some(plan)) => match (plan.status, plan.final_document) {
            (PlanStatus::Completed, Some(document)) => Json(json!({
                "plan_id": plan.id,
                "document": document,
                "total_cost": plan.total_cost,
            }))
            .into_response(),
            _ => (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "O plano ainda não está concluído."})),
            )
                .into_response(),
        },
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Plano não encontrado."})),
        )
            .into_response(),
        Err(err) => {
            error!(plan_id = %plan_id, error = %err, "Plan lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Erro interno."})),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::llm::client::mock::{MockJsonClient, MockLlmClient};
    use crate::pipeline::testing as pipeline_testing;

    /// App state over an in-memory store and the given mock clients
    pub fn app(json_client: Arc<MockJsonClient>, text_client: Arc<MockLlmClient>) -> AppState {
        AppState {
            state: StateManager::spawn_in_memory().unwrap(),
            json_client,
            text_client,
            prompts: Arc::new(PromptLoader::embedded_only()),
            tiers: pipeline_testing::tiers(),
            notifier: None,
            stream: StreamConfig::default(),
        }
    }
}
