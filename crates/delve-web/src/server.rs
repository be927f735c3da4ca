//! Axum server setup and router construction.

use std::net::SocketAddr;

use axum::Router;
use axum::routing::{get, post};
use delve_rs::research::LatestProgress;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use crate::api::{self, AppState, ResearcherFactory};

/// Build the full axum router.
pub fn build_router(factory: ResearcherFactory, progress: LatestProgress) -> Router {
    let state = AppState { factory, progress };

    // Browser frontends are served from other origins.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/research", post(api::post_research))
        .route("/api/progress", get(api::get_progress))
        .with_state(state)
        .layer(cors)
}

/// Bind `bind_addr`, serve `router` on a background task and return the
/// bound address.
pub async fn start_server(router: Router, bind_addr: SocketAddr) -> std::io::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("Research API server stopped: {e}");
        }
    });

    Ok(addr)
}
