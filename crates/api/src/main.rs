mod routes;

use anyhow::{Context, Result};
use extract::OllamaClient;
use pipeline::{AppConfig, Pipeline, WorkerPool};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::routes::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let backend = Arc::new(OllamaClient::with_timeout(
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        Duration::from_secs(config.llm.request_timeout_secs),
    ));

    let pins = match &config.cache.pins_path {
        Some(path) => score::load_pins(path).await?,
        None => Arc::new(HashMap::new()),
    };

    let pool = WorkerPool::new(config.concurrency.max_concurrent_runs);
    let bind_addr = config.bind_addr.clone();
    let pipeline = Pipeline::new(backend.clone(), config).with_pins(pins);

    let state = AppState::new(Arc::new(pipeline), pool, backend);
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;

    tracing::info!(addr = %bind_addr, "Server listening");

    axum::serve(listener, app).await.context("Server stopped unexpectedly")
}

/// JSON lines when `LOG_FORMAT=json`, human-readable otherwise. `RUST_LOG`
/// picks the level, `info` by default.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
