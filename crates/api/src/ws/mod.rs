//! WebSocket infrastructure for streaming execution results.
//!
//! Provides the subscription hub, heartbeat monitoring, and the HTTP
//! upgrade handlers used by Axum routes.

mod handler;
mod heartbeat;
pub mod hub;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub use handler::{ws_handler, ws_handler_with_id};
pub use heartbeat::start_heartbeat;
pub use hub::SubscriptionHub;

/// Mount the subscriber WebSocket routes (root-level).
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws/code-execution", get(ws_handler))
        .route("/ws/code-execution/{execution_id}", get(ws_handler_with_id))
}
