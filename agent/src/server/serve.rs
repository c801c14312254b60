//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::authn::{require_signature, AuthGate};
use crate::errors::AgentError;
use crate::server::handlers::{
    health_handler, host_info_handler, start_pool_handler, start_process_handler,
    stop_pool_handler, stop_process_handler, update_pool_handler, update_process_handler,
    version_handler,
};
use crate::server::state::ServerState;

fn gated(router: Router<Arc<ServerState>>, gate: &AuthGate) -> Router<Arc<ServerState>> {
    router.route_layer(middleware::from_fn_with_state(gate.clone(), require_signature))
}

/// Build the application router
pub fn router(state: Arc<ServerState>) -> Router {
    let gates = state.gates.clone();

    let updates = gated(
        Router::new()
            .route("/api/update/pool/{name}", post(update_pool_handler))
            .route("/api/update/process/{name}", post(update_process_handler)),
        &gates.update,
    );

    let starts = gated(
        Router::new()
            .route("/api/update/pool/{name}/start", post(start_pool_handler))
            .route("/api/update/process/{name}/start", post(start_process_handler)),
        &gates.start,
    );

    let stops = gated(
        Router::new()
            .route("/api/update/pool/{name}/stop", post(stop_pool_handler))
            .route("/api/update/process/{name}/stop", post(stop_process_handler)),
        &gates.stop,
    );

    let host_info = gated(
        Router::new().route("/api/update/computer/info", post(host_info_handler)),
        &gates.host_info,
    );

    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Authenticated operations
        .merge(updates)
        .merge(starts)
        .merge(stops)
        .merge(host_info)
        // Uploads are whole application trees
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), AgentError>>, AgentError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| AgentError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| AgentError::ServerError(e.to_string()))
    });

    Ok(handle)
}
