pub mod code_execution;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/code-execution` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /api/code-execution/execute                submit code for execution (POST)
/// /api/code-execution/validate               compile-check only (POST)
/// /api/code-execution/health                 service health probe
/// /api/code-execution/supported-languages    the closed language set
/// /api/code-execution/status/{execution_id}  placeholder status advice
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/api/code-execution", code_execution::router())
}
