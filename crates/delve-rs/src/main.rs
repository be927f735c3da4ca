//! Run a research tree from the command line and print the report.
//!
//! Reads `OPENROUTER_KEY` (required), `FIRECRAWL_KEY`, `FIRECRAWL_BASE_URL`
//! and the other variables listed on [`DelveConfig::from_env`].
//!
//! # Examples
//!
//! ```sh
//! # Long-form report to stdout
//! delve research "impact of caffeine on sleep"
//!
//! # Wider, deeper, written to a file
//! delve research "solid-state battery startups" --breadth 6 --depth 3 --output report.md
//!
//! # Short answer, with answers to clarifying questions folded in
//! delve research "Which planet has the most moons?" --mode answer \
//!   --context "As of which year?::2024"
//!
//! # Just the clarifying questions
//! delve questions "impact of caffeine on sleep" -n 3
//! ```

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use delve_rs::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Recursive web research from the command line.
#[derive(Parser)]
#[command(name = "delve", version)]
struct Cli {
    /// Model identifier (overrides DELVE_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Branches in flight per limiter (overrides DELVE_CONCURRENCY)
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Research a topic and write a report or answer
    Research {
        /// What to research
        query: String,

        /// Sub-queries per level (halved at each level down)
        #[arg(long, default_value_t = 4)]
        breadth: usize,

        /// Recursion levels
        #[arg(long, default_value_t = 2)]
        depth: usize,

        /// Output style
        #[arg(long, value_enum, default_value_t = Mode::Report)]
        mode: Mode,

        /// Answer to a clarifying question, as "QUESTION::ANSWER" (repeatable)
        #[arg(long = "context")]
        context: Vec<String>,

        /// Share one limiter across the whole tree instead of one per level
        #[arg(long)]
        shared_limiter: bool,

        /// Write the output to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print clarifying questions for a topic
    Questions {
        query: String,

        /// Maximum number of questions
        #[arg(short = 'n', long, default_value_t = 3)]
        count: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Long-form Markdown report with sources
    Report,
    /// Short, precise answer
    Answer,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn parse_context(pairs: &[String]) -> Result<Vec<(String, String)>, String> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once("::")
                .map(|(q, a)| (q.trim().to_string(), a.trim().to_string()))
                .ok_or_else(|| format!("--context expects QUESTION::ANSWER, got {pair:?}"))
        })
        .collect()
}

fn build_researcher(cli: &Cli, shared_limiter: bool) -> Result<Researcher, String> {
    let mut config = DelveConfig::from_env().map_err(|e| e.to_string())?;
    if let Some(model) = &cli.model {
        config = config.with_model(model.clone());
    }
    if let Some(n) = cli.concurrency {
        config = config.with_concurrency(n);
    }
    if shared_limiter {
        config = config.with_concurrency_mode(ConcurrencyMode::Shared);
    }

    let model = ChatClient::new(&config.model).map_err(|e| e.to_string())?;
    let search = FirecrawlClient::new(&config.search).map_err(|e| e.to_string())?;
    info!("Using model {}", model.model());

    Ok(Researcher::new(Arc::new(model), Arc::new(search), &config)
        .with_observer(Arc::new(LoggingObserver)))
}

async fn run(cli: &Cli) -> Result<(), String> {
    match &cli.command {
        Command::Questions { query, count } => {
            let researcher = build_researcher(cli, false)?;
            for question in researcher.plan_follow_ups(query, *count).await {
                println!("{question}");
            }
            Ok(())
        }
        Command::Research {
            query,
            breadth,
            depth,
            mode,
            context,
            shared_limiter,
            output,
        } => {
            let answers = parse_context(context)?;
            let researcher = build_researcher(cli, *shared_limiter)?;
            let full_query = combined_query(query, &answers);

            info!("Starting research (breadth {breadth}, depth {depth})");
            let result = researcher
                .research(&full_query, *breadth, *depth)
                .await
                .map_err(|e| e.to_string())?;
            info!(
                "Learnings: {}, visited URLs: {}",
                result.learnings.len(),
                result.visited_urls.len()
            );

            let text = match mode {
                Mode::Report => {
                    researcher
                        .write_report(&full_query, &result.learnings, &result.visited_urls)
                        .await
                }
                Mode::Answer => researcher.write_answer(&full_query, &result.learnings).await,
            };

            match output {
                Some(path) => {
                    std::fs::write(path, &text)
                        .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
                    info!("Wrote {}", path.display());
                }
                None => println!("{text}"),
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
