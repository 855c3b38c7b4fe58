//! HTTP surface and connection hand-off.
//!
//! One upgrade-capable chat route plus a health check. Everything after
//! the upgrade is handled by the core: the socket is split into its two
//! halves and a session takes over.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use parley_core::{validate_identity, Registry, RegistryHandle, Session};
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Handle to the registry loop.
    pub registry: RegistryHandle,
    /// Server configuration.
    pub config: Config,
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start. Once listening, it
/// runs until the process is killed; there is no shutdown path.
pub async fn run_server(config: Config) -> Result<()> {
    // The registry loop runs for the life of the process.
    let (registry, handle) = Registry::new();
    tokio::spawn(registry.run());

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let state = Arc::new(AppState {
        registry: handle,
        config: config.clone(),
    });

    // Build router
    let app = Router::new()
        .route(&config.transport.chat_path, get(chat_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("parley listening on {}", addr);
    info!(
        "Chat endpoint: ws://{}{}?user_id=<identity>",
        addr, config.transport.chat_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.registry.stats().await.unwrap_or_default();
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": stats.connections,
    }))
}

/// Query parameters for the chat endpoint.
#[derive(Debug, Deserialize)]
struct ChatParams {
    #[serde(default)]
    user_id: String,
}

/// WebSocket upgrade handler for the chat endpoint.
///
/// The identity is validated before the upgrade: a missing or empty
/// `user_id` is a request-level failure, never a registry event.
async fn chat_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ChatParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    if let Err(reason) = validate_identity(&params.user_id) {
        warn!(error = reason, "rejected upgrade");
        metrics::record_rejected_upgrade();
        return (
            StatusCode::BAD_REQUEST,
            "user_id query parameter is required",
        )
            .into_response();
    }

    let registry = state.registry.clone();
    let identity = params.user_id;
    ws.max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, identity, registry))
        .into_response()
}

/// Drive one connection from upgrade to teardown.
async fn handle_socket(socket: WebSocket, identity: String, registry: RegistryHandle) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    debug!(identity = %identity, "WebSocket connected");

    let (outbound, inbound) = parley_transport::split(socket);
    let session = Session::open(identity.clone(), inbound, Box::new(outbound), registry);
    session.run().await;

    debug!(identity = %identity, "WebSocket task finished");
}
