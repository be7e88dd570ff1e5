//! HTTP/SSE gateway for the multi-agent orchestration runtime (spec §6.1, C10).
//!
//! Exposes exactly four routes: `POST /chat/stream`, `POST /chat/resume`,
//! `GET /state/:thread_id`, and `GET /` (liveness). Owns per-process
//! initialization (spec §5 "Shared-resource policy"): the agent team, LLM
//! provider, and checkpoint store are each built once in [`AppState::from_config`]
//! and shared read-only across every request behind an `Arc`.

mod handlers;
mod state;

pub use state::{AppState, GatewayError};

use axum::routing::{get, post};
use axum::Router;

/// Builds the axum [`Router`] serving spec §6.1's four endpoints.
pub fn router(state: std::sync::Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::liveness))
        .route("/chat/stream", post(handlers::chat_stream))
        .route("/chat/resume", post(handlers::chat_resume))
        .route("/state/:thread_id", get(handlers::thread_state))
        .with_state(state)
}

/// Runs the gateway on `addr` (default `127.0.0.1:8080`) until the process is
/// killed. `state` is built once by the caller (typically via
/// [`AppState::from_config`]), so per-process initialization happens exactly
/// once regardless of how many listeners are bound across a test run.
pub async fn run_serve(
    addr: Option<&str>,
    state: std::sync::Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = addr.unwrap_or("127.0.0.1:8080");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("conclave-serve listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
