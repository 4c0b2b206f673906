use anyhow::Result;
use axum::{
    Router,
    routing::{get, post},
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use super::{handlers, state::AppState};
use crate::registry::Registry;

/// Builds the router with every registry route.
pub fn router(registry: Registry) -> Router {
    let app_state = Arc::new(AppState { registry });

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Config operations
        .route("/configs", post(handlers::create_config))
        .route(
            "/configs/:id",
            get(handlers::list_config_versions).post(handlers::put_config_version),
        )
        .route(
            "/configs/:id/:version",
            get(handlers::get_config).delete(handlers::delete_config),
        )
        // Group operations
        .route("/groups", post(handlers::create_group))
        .route(
            "/groups/:id",
            get(handlers::list_group_versions).post(handlers::put_group_version),
        )
        .route(
            "/groups/:id/:version",
            get(handlers::get_group).delete(handlers::delete_group),
        )
        // Label index
        .route("/groups/:id/:version/labels", post(handlers::add_labels))
        .route(
            "/groups/:id/:version/labels/:labels",
            get(handlers::find_labels),
        )
        // Add state
        .with_state(app_state)
        // Add middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn start_server(registry: Registry, bind_address: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(bind_address).await?;
    serve(listener, registry).await
}

/// Serves the registry on an already-bound listener until Ctrl-C.
pub async fn serve(listener: TcpListener, registry: Registry) -> Result<()> {
    let app = router(registry);

    info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
