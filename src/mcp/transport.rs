//! Transport layer for MCP server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::{Json, Router};
use rmcp::transport::stdio;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::tower::{
    StreamableHttpServerConfig, StreamableHttpService,
};
use rmcp::ServiceExt;
use tracing::info;

use crate::config::{Config, TransportType};
use crate::mcp::{HealthResponse, RegistrarServer};
use crate::metrics::get_metrics;
use crate::service::RecordsService;

/// Run the MCP server with stdio transport.
pub async fn run_stdio(server: RegistrarServer) -> Result<()> {
    info!("Starting registrar MCP server with stdio transport");

    let service = server.serve(stdio()).await?;

    info!("Registrar MCP server running...");
    service.waiting().await?;

    info!("Registrar MCP server shutting down");
    Ok(())
}

/// Run the MCP server with Streamable HTTP transport.
///
/// Every session gets its own handler, all backed by one `RecordsService`
/// so cached portal data is shared.
pub async fn run_http(config: Config, service: Arc<RecordsService>, port: u16) -> Result<()> {
    info!(port, "Starting registrar MCP server with HTTP transport");

    let session_manager = Arc::new(LocalSessionManager::default());
    let health_service = Arc::clone(&service);

    let http_service = StreamableHttpService::new(
        move || {
            Ok(RegistrarServer::with_service(
                config.clone(),
                Arc::clone(&service),
            ))
        },
        session_manager,
        StreamableHttpServerConfig::default(),
    );

    let app = Router::new()
        .route("/health", axum::routing::get(health_check))
        .route("/metrics", axum::routing::get(metrics_handler))
        .route("/", axum::routing::get(root_handler))
        .fallback_service(http_service)
        .with_state(health_service);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Registrar MCP server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    info!("Registrar MCP server shutting down");
    Ok(())
}

/// Health check endpoint, with the state of every cache domain.
async fn health_check(State(service): State<Arc<RecordsService>>) -> Json<HealthResponse> {
    Json(HealthResponse::from_stats(
        service.cache_stats(),
        get_metrics().uptime_secs(),
    ))
}

/// Prometheus text exposition.
async fn metrics_handler() -> String {
    let metrics = get_metrics();
    metrics.update_uptime();
    metrics.export_prometheus()
}

/// Root handler with basic info.
async fn root_handler() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "registrar",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Academic portal MCP server",
        "endpoints": {
            "health": "/health",
            "metrics": "/metrics"
        }
    }))
}

/// Run the MCP server with the configured transport.
pub async fn run_server(server: RegistrarServer, transport: TransportType, port: u16) -> Result<()> {
    match transport {
        TransportType::Stdio => run_stdio(server).await,
        TransportType::Http => {
            let config = server.config().clone();
            run_http(config, server.service(), port).await
        }
    }
}
