use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use codestream_api::config::ServerConfig;
use codestream_api::dispatch::Dispatcher;
use codestream_api::{routes, ws};
use codestream_broker::Broker;
use codestream_executor::CodeExecutor;

use codestream_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "codestream_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- CORS ---
    let cors = build_cors_layer(&config);

    // --- Broker ---
    let broker = Arc::new(Broker::new(config.amqp_url.clone()));
    tracing::info!(url = %config.amqp_url, "Broker adapter created");

    // --- Subscription hub ---
    let hub = Arc::new(ws::SubscriptionHub::new());

    // --- Heartbeat ---
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&hub));

    // --- Dispatcher ---
    let executor = CodeExecutor::new(Duration::from_secs(config.execution_timeout_secs));
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&broker),
        Arc::clone(&hub),
        executor,
    ));
    let dispatcher_state = dispatcher.state();

    let dispatcher_cancel = CancellationToken::new();
    let dispatcher_force = CancellationToken::new();
    let dispatcher_handle = tokio::spawn({
        let dispatcher = Arc::clone(&dispatcher);
        let cancel = dispatcher_cancel.clone();
        let force = dispatcher_force.clone();
        async move { dispatcher.run(cancel, force).await }
    });
    tracing::info!("Dispatcher started");

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        broker: Arc::clone(&broker),
        hub: Arc::clone(&hub),
        dispatcher_state,
    };

    // --- Request ID header name ---
    let request_id_header = HeaderName::from_static("x-request-id");

    // --- Router ---
    let app = Router::new()
        // Subscriber WebSocket routes at root level.
        .merge(ws::router())
        // Submission API routes.
        .merge(routes::api_routes())
        // -- Middleware stack (applied bottom-up) --
        // Panic recovery: catch panics and return 500 JSON.
        .layer(CatchPanicLayer::new())
        // Request timeout.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        // Propagate request ID to response.
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        // Structured request/response tracing.
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Set request ID on incoming requests.
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        // CORS.
        .layer(cors)
        // Shared state.
        .with_state(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Stop the dispatcher: graceful first (in-flight execution finishes),
    // escalating to a hard cancel after the grace bound.
    dispatcher_cancel.cancel();
    let grace = Duration::from_secs(config.shutdown_timeout_secs);
    let mut dispatcher_handle = dispatcher_handle;
    if tokio::time::timeout(grace, &mut dispatcher_handle)
        .await
        .is_err()
    {
        tracing::warn!("Dispatcher did not stop in time; forcing cancel");
        dispatcher_force.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(5), dispatcher_handle).await;
    }
    tracing::info!("Dispatcher stopped");

    broker.close().await;

    let ws_count = hub.connection_count().await;
    tracing::info!(ws_count, "Closing remaining subscriber connections");
    hub.shutdown_all().await;

    heartbeat_handle.abort();
    tracing::info!("Heartbeat task stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Build the CORS middleware layer from server configuration.
///
/// Panics at startup if any configured origin is invalid, which is the
/// desired behaviour -- we want misconfiguration to fail fast.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
