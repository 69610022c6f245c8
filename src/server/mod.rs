//! HTTP server - routes, handlers and shared state.

mod error;
mod handlers;
mod state;

use std::net::SocketAddr;

use axum::Router;
use axum::http::Method;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::ApiError;
pub use handlers::REVALIDATE_HEADER;
pub use state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/api/compositions", get(handlers::list_compositions))
        .route("/api/compositions/:id", get(handlers::get_composition))
        .route(
            "/api/compositions/category/:category",
            get(handlers::compositions_by_category),
        )
        .route("/api/health", get(handlers::health))
        .route("/api/cache/stats", get(handlers::cache_stats))
        .route("/api/cache/invalidate", post(handlers::invalidate_cache))
        .route("/api/checkout", post(handlers::create_checkout))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve until Ctrl+C.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
