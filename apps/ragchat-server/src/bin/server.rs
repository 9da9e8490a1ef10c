use std::sync::Arc;

use anyhow::Context;

use ragchat_server::bootstrap::{self, CliArgs};
use ragchat_server::{router, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = CliArgs::parse(&args).map_err(|e| {
        eprintln!("Usage: ragchat-server [--config-dir DIR]");
        e
    })?;
    let root = cli.root()?;
    let settings = bootstrap::load_settings(&root)?;

    let lifecycle = Arc::new(bootstrap::build_lifecycle(&settings, &root)?);
    let generation = lifecycle.initialize().await.context("failed to initialize index")?;
    tracing::info!(index_id = generation.index.id(), chunks = generation.index.len(), "index ready");

    let app = router(bootstrap::app_state(&settings, lifecycle));
    let bind_addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("cannot bind {bind_addr}"))?;
    tracing::info!("ragchat server listening on {}", bind_addr);
    tracing::info!("  POST /chat");
    tracing::info!("  POST /query");
    tracing::info!("  POST /update_index");
    tracing::info!("  GET  /health");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}
