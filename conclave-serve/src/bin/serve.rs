//! Process entry point for the HTTP/SSE gateway (spec §6.1, C10).

use std::sync::Arc;

use conclave_config::TeamConfig;
use conclave_serve::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let _ = conclave_config::load_and_apply("conclave", None);
    let cfg = TeamConfig::from_env();

    let state = Arc::new(AppState::from_config(&cfg).map_err(|e| {
        tracing::error!("fatal startup error: {e}");
        e
    })?);

    let addr = std::env::var("CONCLAVE_SERVE_ADDR").ok();
    conclave_serve::run_serve(addr.as_deref(), state).await
}
