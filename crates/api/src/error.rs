use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use codestream_broker::BrokerError;
use codestream_core::CoreError;

/// Application-level error type for HTTP handlers.
///
/// Implements [`IntoResponse`] to produce the `{"detail": ...}` JSON
/// error bodies of the submission API. Internal details are logged,
/// never leaked to clients.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `codestream_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A broker failure while publishing a submission.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            AppError::Core(core) => match core {
                CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error while processing request".to_string(),
                    )
                }
            },

            AppError::Broker(err) => {
                tracing::error!(error = %err, "Broker error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error while processing request".to_string(),
                )
            }

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),

            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error while processing request".to_string(),
                )
            }
        };

        let body = json!({ "detail": detail });
        (status, axum::Json(body)).into_response()
    }
}
