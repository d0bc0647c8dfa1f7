//! Integration tests for the HTTP API
//!
//! These tests exercise the full request path: router, handlers, the state
//! actor and the generation pipeline, with scripted clients standing in for
//! the model providers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use planforge::config::{LlmConfig, StreamConfig};
use planforge::llm::{
    CompletionRequest, CompletionResponse, JsonCompletion, LlmClient, LlmError,
    StructuredLlmClient, TokenUsage,
};
use planforge::pipeline::ModelTiers;
use planforge::progress::status_message;
use planforge::prompts::PromptLoader;
use planforge::server::{AppState, router};
use planforge::state::StateManager;
use planstore::PlanStatus;

// =============================================================================
// Scripted model clients
// =============================================================================

/// JSON client that replays a fixed list of replies in call order
struct ScriptedJsonClient {
    replies: Mutex<VecDeque<Value>>,
}

impl ScriptedJsonClient {
    fn new(replies: Vec<Value>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
        }
    }
}

#[async_trait]
impl StructuredLlmClient for ScriptedJsonClient {
    async fn complete_json(&self, _request: CompletionRequest) -> Result<JsonCompletion, LlmError> {
        match self.replies.lock().unwrap().pop_front() {
            Some(jsonvalue) => Ok(JsonCompletion {
                json: jsonvalue,
                usage: TokenUsage::new(120, 240),
            }),
            None => Err(LlmError::ApiError {
                status: 500,
                message: "no more scripted replies".to_string(),
            }),
        }
    }
}

/// Text client that replays a fixed list of replies in call order
struct ScriptedTextClient {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedTextClient {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|text| text.to_string()).collect()),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedTextClient {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        match self.replies.lock().unwrap().pop_front() {
            Some(text) => Ok(CompletionResponse {
                text,
                usage: TokenUsage::new(300, 900),
            }),
            None => Err(LlmError::ApiError {
                status: 500,
                message: "no more scripted replies".to_string(),
            }),
        }
    }
}

// =============================================================================
// Test harness
// =============================================================================

fn sample_brief() -> Value {
    json!({
        "setor": {"descricao": "Restauração local"},
        "concorrentes": [{"nome": "Tasca do Zé"}],
        "contexto_externo": {}
    })
}

fn sample_review() -> Value {
    json!({
        "avaliacao_global": {"nota": 8, "resumo": "Coerente"},
        "problemas_criticos": [],
        "melhorias_recomendadas": []
    })
}

fn scripted_app(json_replies: Vec<Value>, text_replies: &[&str]) -> AppState {
    AppState {
        state: StateManager::spawn_in_memory().expect("Failed to spawn in-memory store"),
        json_client: Arc::new(ScriptedJsonClient::new(json_replies)),
        text_client: Arc::new(ScriptedTextClient::new(text_replies)),
        prompts: Arc::new(PromptLoader::new(None)),
        tiers: ModelTiers::from_config(&LlmConfig::default()),
        notifier: None,
        stream: StreamConfig::default(),
    }
}

fn happy_app() -> AppState {
    scripted_app(
        vec![sample_brief(), sample_review()],
        &[
            "## SECÇÃO 1 do rascunho",
            "## SECÇÃO 6 do rascunho",
            "# PLANO DE MARKETING\n\nSecções 1-5",
            "## SECÇÃO 6\n\nSecções 6-10",
        ],
    )
}

fn post_json(uri: &str, payload: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .expect("Failed to build request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("Failed to build request")
}

async fn read_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}

async fn read_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    String::from_utf8(bytes.to_vec()).expect("Body is not UTF-8")
}

// =============================================================================
// Plan creation
// =============================================================================

#[tokio::test]
async fn test_create_plan_rejects_missing_questionnaire() {
    let app = happy_app();

    let response = router(app)
        .oneshot(post_json("/api/plans", &json!({})))
        .await
        .expect("Request failed");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["error"], "O questionário é obrigatório.");
}

#[tokio::test]
async fn test_create_plan_rejects_empty_questionnaire() {
    let app = happy_app();

    let response = router(app)
        .oneshot(post_json("/api/plans", &json!({"questionnaire": {}})))
        .await
        .expect("Request failed");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_plan_rejects_non_object_questionnaire() {
    let app = happy_app();

    let response = router(app)
        .oneshot(post_json(
            "/api/plans",
            &json!({"questionnaire": "respostas em texto"}),
        ))
        .await
        .expect("Request failed");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_plan_returns_stream_url_and_persists_contact() {
    let app = happy_app();

    let payload = json!({
        "questionnaire": {"respostas": {"1_nome": "Tasca Moderna"}},
        "email": "dono@tasca.pt",
        "name": "João",
    });
    let response = router(app.clone())
        .oneshot(post_json("/api/plans", &payload))
        .await
        .expect("Request failed");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    let plan_id = body["plan_id"].as_str().expect("plan_id missing");
    assert!(!plan_id.is_empty());
    assert_eq!(
        body["stream_url"],
        format!("/api/stream/{}", plan_id).as_str()
    );

    let plan = app
        .state
        .get_plan_required(plan_id)
        .await
        .expect("Plan not stored");
    assert_eq!(plan.status, PlanStatus::Pending);
    let contact = plan.contact.expect("Contact not stored");
    assert_eq!(contact.email, "dono@tasca.pt");
    assert_eq!(contact.name.as_deref(), Some("João"));
}

// =============================================================================
// Document retrieval
// =============================================================================

#[tokio::test]
async fn test_document_for_unknown_plan_is_not_found() {
    let app = happy_app();

    let response = router(app)
        .oneshot(get("/api/plans/0199c2d5-0000/document"))
        .await
        .expect("Request failed");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = read_json(response).await;
    assert_eq!(body["error"], "Plano não encontrado.");
}

#[tokio::test]
async fn test_document_for_incomplete_plan_is_not_found() {
    let app = happy_app();

    let payload = json!({"questionnaire": {"respostas": {"1_nome": "Tasca Moderna"}}});
    let response = router(app.clone())
        .oneshot(post_json("/api/plans", &payload))
        .await
        .expect("Request failed");
    let plan_id = read_json(response).await["plan_id"]
        .as_str()
        .expect("plan_id missing")
        .to_string();

    let response = router(app)
        .oneshot(get(&format!("/api/plans/{}/document", plan_id)))
        .await
        .expect("Request failed");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = read_json(response).await;
    assert_eq!(body["error"], "O plano ainda não está concluído.");
}

// =============================================================================
// SSE streaming
// =============================================================================

#[tokio::test]
async fn test_stream_for_unknown_plan_emits_error_event() {
    let app = happy_app();

    let response = router(app)
        .oneshot(get("/api/stream/desconhecido"))
        .await
        .expect("Request failed");

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .expect("content-type missing")
        .to_str()
        .expect("content-type not ascii")
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let body = read_text(response).await;
    assert!(body.contains("event: error"));
    assert!(body.contains("Plano não encontrado."));
}

#[tokio::test]
async fn test_full_generation_over_http() {
    let app = happy_app();

    // Create
    let payload = json!({"questionnaire": {"respostas": {"1_nome": "Tasca Moderna"}}});
    let response = router(app.clone())
        .oneshot(post_json("/api/plans", &payload))
        .await
        .expect("Request failed");
    let plan_id = read_json(response).await["plan_id"]
        .as_str()
        .expect("plan_id missing")
        .to_string();

    // Stream to completion; the response body ends with the terminal event
    let response = router(app.clone())
        .oneshot(get(&format!("/api/stream/{}", plan_id)))
        .await
        .expect("Request failed");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CACHE_CONTROL)
            .and_then(|value| value.to_str().ok()),
        Some("no-cache")
    );
    assert_eq!(
        response
            .headers()
            .get("x-accel-buffering")
            .and_then(|value| value.to_str().ok()),
        Some("no")
    );

    let body = read_text(response).await;
    // Connection message, pending, then one rung per stage
    assert_eq!(body.matches("event: status").count(), 6);
    for status in [
        PlanStatus::Analysing,
        PlanStatus::Generating,
        PlanStatus::Reviewing,
        PlanStatus::Finalising,
    ] {
        let mensagem = status_message(status).mensagem;
        assert!(body.contains(mensagem), "missing stage message: {mensagem}");
    }
    assert!(body.contains("event: complete"));
    assert!(body.contains(&format!("/api/plans/{}/document", plan_id)));

    // The document is now ready
    let response = router(app.clone())
        .oneshot(get(&format!("/api/plans/{}/document", plan_id)))
        .await
        .expect("Request failed");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(
        body["document"],
        "# PLANO DE MARKETING\n\nSecções 1-5\n\n## SECÇÃO 6\n\nSecções 6-10"
    );
    assert!(body["total_cost"].as_f64().expect("total_cost missing") > 0.0);

    // And the stored plan is sealed
    let plan = app
        .state
        .get_plan_required(&plan_id)
        .await
        .expect("Plan not stored");
    assert_eq!(plan.status, PlanStatus::Completed);
    assert!(plan.completed_at.is_some());
}
