//! Integration tests for the submission API endpoints.

mod common;

use axum::http::StatusCode;
use common::{body_json, build_test_app, get, post_json};
use serde_json::json;

// ---------------------------------------------------------------------------
// Test: POST /execute with neither code nor tabs returns 400
// ---------------------------------------------------------------------------

#[tokio::test]
async fn execute_without_code_or_tabs_is_rejected() {
    let app = build_test_app();
    let response = post_json(
        app,
        "/api/code-execution/execute",
        json!({"language": "python"}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "Either 'code' or 'tabs' must be provided");
}

#[tokio::test]
async fn execute_with_empty_code_and_no_tabs_is_rejected() {
    let app = build_test_app();
    let response = post_json(
        app,
        "/api/code-execution/execute",
        json!({"code": "", "language": "python"}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "Either 'code' or 'tabs' must be provided");
}

// ---------------------------------------------------------------------------
// Test: POST /execute with only blank tabs returns the tab diagnostic
// ---------------------------------------------------------------------------

#[tokio::test]
async fn execute_with_blank_tabs_is_rejected() {
    let app = build_test_app();
    let response = post_json(
        app,
        "/api/code-execution/execute",
        json!({
            "tabs": [
                {"name": "A", "content": "   "},
                {"name": "B", "content": ""},
            ],
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "At least one tab must contain code");
}

// ---------------------------------------------------------------------------
// Test: POST /execute with an unreachable broker returns 500
// ---------------------------------------------------------------------------

#[tokio::test]
async fn execute_with_unreachable_broker_returns_500() {
    let app = build_test_app();
    let response = post_json(
        app,
        "/api/code-execution/execute",
        json!({"code": "print(1)", "language": "python"}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(
        body["detail"],
        "Internal server error while processing request"
    );
}

// ---------------------------------------------------------------------------
// Test: GET /supported-languages returns the closed set
// ---------------------------------------------------------------------------

#[tokio::test]
async fn supported_languages_lists_the_closed_set() {
    let app = build_test_app();
    let response = get(app, "/api/code-execution/supported-languages").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    let languages: Vec<&str> = body["languages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(languages, vec!["python", "javascript", "js", "node"]);
    assert_eq!(body["default"], "python");
}

// ---------------------------------------------------------------------------
// Test: GET /status/{execution_id} advises the WebSocket URL
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_advises_websocket_url() {
    let app = build_test_app();
    let response = get(app, "/api/code-execution/status/exec-42").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["execution_id"], "exec-42");
    assert_eq!(body["websocket_url"], "/ws/code-execution/exec-42");
}

// ---------------------------------------------------------------------------
// Test: POST /validate accepts well-formed Python
// ---------------------------------------------------------------------------

#[tokio::test]
async fn validate_accepts_wellformed_python() {
    let app = build_test_app();
    let response = post_json(
        app,
        "/api/code-execution/validate",
        json!({"code": "print('ok')\n", "language": "python"}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["language"], "python");
    assert_eq!(body["validation"]["valid"], true);
    assert_eq!(body["validation"]["errors"].as_array().unwrap().len(), 0);
    assert_eq!(body["code_length"], 12);
    assert_eq!(body["line_count"], 1);
}

// ---------------------------------------------------------------------------
// Test: POST /validate reports a Python syntax error with position
// ---------------------------------------------------------------------------

#[tokio::test]
async fn validate_reports_python_syntax_error() {
    let app = build_test_app();
    let response = post_json(
        app,
        "/api/code-execution/validate",
        json!({"code": "print('x'", "language": "python"}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["validation"]["valid"], false);

    let errors = body["validation"]["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["type"], "syntax_error");
    assert!(errors[0]["message"]
        .as_str()
        .unwrap()
        .contains("SyntaxError"));
    assert_eq!(errors[0]["line"], 1);
}

// ---------------------------------------------------------------------------
// Test: POST /validate always accepts JavaScript in this version
// ---------------------------------------------------------------------------

#[tokio::test]
async fn validate_always_accepts_javascript() {
    let app = build_test_app();
    let response = post_json(
        app,
        "/api/code-execution/validate",
        json!({"code": "function (", "language": "js"}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["validation"]["valid"], true);
}

#[tokio::test]
async fn validate_rejects_unknown_language() {
    let app = build_test_app();
    let response = post_json(
        app,
        "/api/code-execution/validate",
        json!({"code": "x", "language": "brainfuck"}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "Unsupported language: brainfuck");
}

// ---------------------------------------------------------------------------
// Test: GET /health reports unhealthy without a broker
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_unhealthy_without_broker() {
    let app = build_test_app();
    let response = get(app, "/api/code-execution/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["services"]["rabbitmq"], "disconnected");
    assert!(body["timestamp"].is_string());
    assert!(body["error"].is_string());
}
