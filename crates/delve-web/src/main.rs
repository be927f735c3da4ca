//! Research API server.
//!
//! # Usage
//!
//! ```bash
//! OPENROUTER_KEY=sk-... FIRECRAWL_KEY=fc-... cargo run -p delve-web
//! OPENROUTER_KEY=sk-... cargo run -p delve-web -- --port 8080 --concurrency 4
//! ```
//!
//! Then run a query:
//!
//! ```bash
//! curl -s localhost:3051/api/research \
//!   -H 'content-type: application/json' \
//!   -d '{"query": "impact of caffeine on sleep", "depth": 2, "breadth": 3}'
//! ```

use std::sync::Arc;

use clap::Parser;
use delve_rs::prelude::*;
use delve_web::{ResearcherFactory, WebConfig, spawn_web};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Research API server.
#[derive(Parser)]
#[command(about = "Serve recursive web research over HTTP")]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 3051)]
    port: u16,

    /// Bind on all interfaces instead of localhost only.
    #[arg(long)]
    public: bool,

    /// Model identifier (overrides DELVE_MODEL).
    #[arg(long)]
    model: Option<String>,

    /// Branches in flight per limiter (overrides DELVE_CONCURRENCY).
    #[arg(long)]
    concurrency: Option<usize>,
}

fn factory(args: &Args) -> ResearcherFactory {
    let model_override = args.model.clone();
    let concurrency = args.concurrency;
    Arc::new(move || -> Result<Researcher, ConfigError> {
        let mut config = DelveConfig::from_env()?;
        if let Some(model) = &model_override {
            config = config.with_model(model.clone());
        }
        if let Some(n) = concurrency {
            config = config.with_concurrency(n);
        }
        let model = ChatClient::new(&config.model)?;
        let search = FirecrawlClient::new(&config.search)?;
        Ok(Researcher::new(Arc::new(model), Arc::new(search), &config))
    })
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let host = if args.public { [0, 0, 0, 0] } else { [127, 0, 0, 1] };
    let config = WebConfig {
        bind_addr: (host, args.port).into(),
    };

    let addr = spawn_web(factory(&args), config)
        .await
        .map_err(|e| format!("failed to bind port {}: {e}", args.port))?;
    info!("Research API running on http://{addr}");

    tokio::signal::ctrl_c().await.map_err(|e| e.to_string())?;
    info!("Shutting down");
    Ok(())
}
