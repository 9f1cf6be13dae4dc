//! Question-paper analysis server.
//!
//! Configuration comes from the environment (optionally via a `.env` file):
//! `GEMINI_API_KEY`, `GEMINI_MODEL`, `HOST`, `PORT`, `CORS_ORIGINS`,
//! `RENDER_DPI`, `CROP_PADDING`. A missing API key is a warning at startup,
//! not a crash — health checks work without one, analysis calls fail until
//! it is set.

use anyhow::Context;
use mcq_vision::{api, ServiceConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let config = ServiceConfig::from_env();
    if !config.gemini_configured() {
        warn!("GEMINI_API_KEY is not set; analysis endpoints will fail until it is configured");
    }

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(
        "mcq-vision v{} listening on {addr}, model {}",
        env!("CARGO_PKG_VERSION"),
        config.model
    );

    axum::serve(listener, api::router(config))
        .await
        .context("Server error")?;
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mcq_vision=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
