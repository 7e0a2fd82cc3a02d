use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use codestream_broker::CODE_EXECUTION_QUEUE;
use codestream_core::language::{DEFAULT_LANGUAGE, SUPPORTED_LANGUAGES};
use codestream_core::{Language, Submission, Tab};

use crate::dispatch::DispatcherState;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Mount the code-execution routes (nested under `/api/code-execution`).
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/execute", post(execute))
        .route("/validate", post(validate))
        .route("/health", get(health))
        .route("/supported-languages", get(supported_languages))
        .route("/status/{execution_id}", get(execution_status))
}

// ---------------------------------------------------------------------------
// POST /execute
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub tabs: Option<Vec<Tab>>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub execution_id: Option<String>,
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub execution_id: String,
    pub status: &'static str,
    pub message: &'static str,
    pub websocket_url: String,
}

/// Validate the request, assign an execution identifier if absent, and
/// publish the submission to the execution queue.
async fn execute(
    State(state): State<AppState>,
    Json(req): Json<ExecuteRequest>,
) -> AppResult<Json<ExecuteResponse>> {
    validate_execute_request(&req)?;

    let execution_id = req
        .execution_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let submission = Submission {
        execution_id: execution_id.clone(),
        code: req.code,
        language: req.language,
        tabs: req.tabs,
        user_id: req.user_id,
        timestamp: chrono::Utc::now(),
        request_source: "api".to_string(),
    };

    state
        .broker
        .publish(CODE_EXECUTION_QUEUE, &submission)
        .await?;

    tracing::info!(
        execution_id = %execution_id,
        language = %submission.language,
        "Submission queued",
    );

    Ok(Json(ExecuteResponse {
        websocket_url: format!("/ws/code-execution/{execution_id}"),
        execution_id,
        status: "queued",
        message: "Execution queued; connect to the WebSocket for results",
    }))
}

/// The submission invariant: non-empty `code`, or at least one tab with
/// non-whitespace content.
fn validate_execute_request(req: &ExecuteRequest) -> Result<(), AppError> {
    if req.code.as_deref().is_some_and(|c| !c.is_empty()) {
        return Ok(());
    }

    match req.tabs.as_deref() {
        None | Some([]) => Err(AppError::BadRequest(
            "Either 'code' or 'tabs' must be provided".to_string(),
        )),
        Some(tabs) => {
            if tabs.iter().any(|t| !t.content.trim().is_empty()) {
                Ok(())
            } else {
                Err(AppError::BadRequest(
                    "At least one tab must contain code".to_string(),
                ))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// POST /validate
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default = "default_language")]
    pub language: String,
}

#[derive(Debug, Serialize)]
struct ValidationIssue {
    #[serde(rename = "type")]
    kind: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    column: Option<u32>,
}

/// Compile-check only: Python runs the AST check, JavaScript always
/// passes in this version. Nothing is executed.
async fn validate(
    State(_state): State<AppState>,
    Json(req): Json<ValidateRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let language = Language::parse(&req.language).ok_or_else(|| {
        AppError::BadRequest(format!("Unsupported language: {}", req.language))
    })?;

    let errors: Vec<ValidationIssue> = match language {
        Language::Python => {
            let check = codestream_executor::compile_check(&req.code)
                .await
                .map_err(|e| AppError::Internal(e.to_string()))?;
            if check.valid {
                Vec::new()
            } else {
                vec![ValidationIssue {
                    kind: "syntax_error",
                    message: check
                        .message
                        .unwrap_or_else(|| "SyntaxError".to_string()),
                    line: check.line,
                    column: check.column,
                }]
            }
        }
        Language::JavaScript => Vec::new(),
    };

    Ok(Json(json!({
        "language": req.language,
        "validation": {
            "valid": errors.is_empty(),
            "errors": errors,
        },
        "code_length": req.code.len(),
        "line_count": req.code.lines().count(),
    })))
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

/// Health of the pipeline's two services: the broker connection and the
/// dispatcher consumer loop.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let rabbitmq_up = state.broker.health().await;
    let dispatcher = *state.dispatcher_state.borrow();
    let dispatcher_up = dispatcher == DispatcherState::Running;

    let healthy = rabbitmq_up && dispatcher_up;

    let mut body = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "services": {
            "rabbitmq": if rabbitmq_up { "connected" } else { "disconnected" },
            "code_execution": dispatcher.as_str(),
        },
        "timestamp": chrono::Utc::now(),
    });

    if !healthy {
        let reason = if rabbitmq_up {
            "code execution consumer is not running"
        } else {
            "message broker is unreachable"
        };
        body["error"] = json!(reason);
    }

    Json(body)
}

// ---------------------------------------------------------------------------
// GET /supported-languages
// ---------------------------------------------------------------------------

async fn supported_languages() -> Json<serde_json::Value> {
    Json(json!({
        "languages": SUPPORTED_LANGUAGES,
        "default": DEFAULT_LANGUAGE,
    }))
}

// ---------------------------------------------------------------------------
// GET /status/{execution_id}
// ---------------------------------------------------------------------------

/// Placeholder: execution results are not persisted; live updates are
/// only available over the WebSocket.
async fn execution_status(Path(execution_id): Path<String>) -> Json<serde_json::Value> {
    Json(json!({
        "execution_id": execution_id,
        "status": "unknown",
        "message": "Connect to the WebSocket for live execution updates",
        "websocket_url": format!("/ws/code-execution/{execution_id}"),
    }))
}
