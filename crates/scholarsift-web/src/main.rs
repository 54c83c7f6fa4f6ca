//! scholarsift server
//!
//! Run with: cargo run -p scholarsift-web

use std::sync::Arc;

use anyhow::Context;
use scholarsift_config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scholarsift=debug,info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting scholarsift server...");

    let config = Config::load().context("loading configuration")?;
    let state = scholarsift_web::state::AppState::from_config(&config)?;
    let app = scholarsift_web::router::build_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("binding {}", config.server.bind))?;
    info!("Server listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;

    Ok(())
}
