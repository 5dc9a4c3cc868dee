//! MCP server initialization for stdio and streamable HTTP transports.
//!
//! Provides [`serve_stdio`] and [`serve_http`] entry points that open the identity
//! directory and the catalogue, and wire them into a running MCP tool handler.

use crate::config::FaceprintConfig;
use crate::db::SqliteDirectory;
use crate::engine::RecognitionEngine;
use crate::service::{FaceService, ServiceSettings};
use crate::tools::FaceprintTools;
use anyhow::{Context, Result};
use rmcp::ServiceExt;
use std::sync::Arc;
use std::time::Duration;

/// Shared setup: open the directory, load the catalogue, build the service.
pub fn setup_service(config: &FaceprintConfig) -> Result<FaceService> {
    let db_path = config.resolved_db_path();
    let directory = Arc::new(SqliteDirectory::open(&db_path)?);
    tracing::info!(db = %db_path.display(), "identity directory ready");

    let engine = RecognitionEngine::open(config, directory)
        .context("failed to open recognition engine")?;
    let stats = engine.stats();
    tracing::info!(
        identities = stats.identities,
        dimension = ?stats.dimension,
        threshold = stats.match_threshold,
        "recognition engine ready"
    );

    Ok(FaceService::new(
        Arc::new(engine),
        ServiceSettings::from(config),
    ))
}

/// Periodically pick up catalogue writes made by other processes sharing the file.
pub fn start_refresh_task(
    engine: Arc<RecognitionEngine>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval_timer = tokio::time::interval(interval);
        interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval_timer.tick().await;

            let engine = Arc::clone(&engine);
            match tokio::task::spawn_blocking(move || engine.refresh_if_changed()).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "failed to refresh catalogue"),
                Err(e) => tracing::warn!(error = %e, "catalogue refresh task failed"),
            }
        }
    })
}

fn maybe_start_refresh(config: &FaceprintConfig, service: &FaceService) {
    let secs = config.storage.reload_interval_secs;
    if secs > 0 {
        start_refresh_task(Arc::clone(service.engine()), Duration::from_secs(secs));
        tracing::debug!(interval_secs = secs, "catalogue refresh enabled");
    }
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: FaceprintConfig) -> Result<()> {
    tracing::info!("starting faceprint MCP server on stdio");

    let service = setup_service(&config)?;
    maybe_start_refresh(&config, &service);

    let tools = FaceprintTools::new(service);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the MCP server over Streamable HTTP transport.
pub async fn serve_http(config: FaceprintConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    tracing::info!(addr = %bind_addr, "starting faceprint MCP server on HTTP");

    let service = setup_service(&config)?;
    maybe_start_refresh(&config, &service);

    let mcp = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(FaceprintTools::new(service.clone())),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", mcp);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}
