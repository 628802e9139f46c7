//! iprep-ai - Interview response analysis CLI
//!
//! `analyze` scores every response in a session file and prints the session
//! report as JSON. `models` prints the routing and price tables.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use iprep_common::config::{load_toml_config, TomlConfig};
use iprep_ai::services::{
    AnalysisClient, BatchOrchestrator, RateLimiter, RateLimiterConfig, ResponseAnalysis,
    ResponseAnalyzer, ThemeClusterer,
};
use iprep_ai::session_file::SessionFile;
use iprep_ai::store::InMemoryStore;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for iprep-ai
#[derive(Parser, Debug)]
#[command(name = "iprep-ai")]
#[command(about = "Analyze spoken interview answers")]
#[command(version)]
struct Args {
    /// Config file (defaults to ~/.config/iprep/iprep-ai.toml)
    #[arg(short, long, global = true, env = "IPREP_CONFIG")]
    config: Option<PathBuf>,

    /// Log level filter, overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a session file and print the report
    Analyze {
        /// Session JSON: {"session_id"?, "responses": [...]}
        session: PathBuf,

        /// Responses analyzed concurrently per window
        #[arg(long)]
        concurrency: Option<usize>,

        /// Skip the model and use heuristic analysis only
        #[arg(long)]
        offline: bool,
    },

    /// Print model routing and prices
    Models,
}

fn init_tracing(config: &TomlConfig, cli_level: Option<&str>) -> Result<()> {
    let level = cli_level.unwrap_or(&config.logging.level).to_string();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("iprep_ai={level},iprep_common={level}")));

    // Logs go to stderr (or a file) so stdout stays clean JSON
    match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_toml_config(args.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config, args.log_level.as_deref())?;

    info!("Starting iprep-ai v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Analyze {
            session,
            concurrency,
            offline,
        } => analyze(&config, session, concurrency, offline).await,
        Command::Models => print_models(&config),
    }
}

async fn analyze(
    config: &TomlConfig,
    session: PathBuf,
    concurrency: Option<usize>,
    offline: bool,
) -> Result<()> {
    let (session_id, responses) = SessionFile::load(&session)
        .with_context(|| format!("Failed to read session file {}", session.display()))?;
    info!(
        "Loaded {} responses for session {} from {}",
        responses.len(),
        session_id,
        session.display()
    );

    let concurrency = concurrency.unwrap_or(config.analysis.batch_concurrency);
    let store = Arc::new(InMemoryStore::new());

    let analyzer: Arc<dyn ResponseAnalysis>;
    let mut themes = None;
    let mut client_handle = None;
    if offline {
        info!("Offline mode: all responses use heuristic analysis");
        analyzer = Arc::new(ResponseAnalyzer::offline());
    } else {
        let limiter = RateLimiter::new(RateLimiterConfig::from_settings(&config.analysis));
        let client = Arc::new(
            AnalysisClient::from_config(config, limiter)
                .context("Failed to initialize analysis client")?,
        );
        analyzer = Arc::new(ResponseAnalyzer::new(client.clone()));
        themes = Some(Arc::new(ThemeClusterer::new(client.clone())));
        client_handle = Some(client);
    }

    let mut orchestrator = BatchOrchestrator::new(analyzer, store, concurrency);
    if let Some(themes) = themes {
        orchestrator = orchestrator.with_theme_clusterer(themes);
    }

    let report = orchestrator
        .process_session(session_id, &responses)
        .await
        .context("Session analysis failed")?;

    if let Some(client) = client_handle {
        let stats = client.limiter().stats();
        info!(
            dispatched = stats.dispatched,
            expired = stats.expired,
            queued = stats.queued,
            "Rate limiter totals"
        );
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_models(config: &TomlConfig) -> Result<()> {
    let routing = &config.models;
    println!("Routing:");
    println!("  behavioral  -> {}", routing.behavioral);
    println!("  leadership  -> {}", routing.leadership);
    println!("  technical   -> {}", routing.technical);
    println!("  custom      -> {}", routing.custom);
    println!();
    println!("Prices (USD per token):");
    for (model, price) in config.effective_prices() {
        println!(
            "  {:<16} input {:e}  output {:e}",
            model, price.input_per_token, price.output_per_token
        );
    }
    Ok(())
}
