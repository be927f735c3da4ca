//! HTTP front door for delve-rs research runs.
//!
//! `delve-web` exposes the research engine over a small REST API built on
//! axum:
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `POST /api/research` | run a research tree and answer the query |
//! | `GET /api/progress` | latest progress snapshot of the running (or last) run |
//!
//! # Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use delve_rs::prelude::*;
//! use delve_web::{ResearcherFactory, WebConfig, spawn_web};
//!
//! let factory: ResearcherFactory = Arc::new(|| -> Result<Researcher, ConfigError> {
//!     let config = DelveConfig::from_env()?;
//!     let model = ChatClient::new(&config.model)?;
//!     let search = FirecrawlClient::new(&config.search)?;
//!     Ok(Researcher::new(Arc::new(model), Arc::new(search), &config))
//! });
//! let addr = spawn_web(factory, WebConfig::default()).await?;
//! println!("Research API: http://{addr}");
//! ```
//!
//! A researcher is built per request through the factory, so configuration
//! problems (a missing API key, say) surface as 500 responses instead of
//! keeping the server from starting.

mod api;
mod server;

pub use api::{ResearchRequest, ResearchResponse, ResearcherFactory};

use std::net::SocketAddr;

use delve_rs::research::LatestProgress;

/// Configuration for the web server.
pub struct WebConfig {
    /// Address to bind to. Default: `127.0.0.1:3051`.
    pub bind_addr: SocketAddr,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3051)),
        }
    }
}

/// Spawn the web server on a Tokio task and return the bound address.
///
/// The server runs until the Tokio runtime shuts down.
pub async fn spawn_web(
    factory: ResearcherFactory,
    config: WebConfig,
) -> std::io::Result<SocketAddr> {
    let router = server::build_router(factory, LatestProgress::new());
    server::start_server(router, config.bind_addr).await
}
