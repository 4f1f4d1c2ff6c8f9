//! Colloquium CLI — run research debates from the terminal.
//!
//! Takes one research question, streams the debate as it unfolds, and
//! prints the published answer.

mod commands;
mod run;

use clap::Parser;
use colloquium_core::config::LogConfig;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Colloquium: a chain-of-debate engine for research questions
#[derive(Parser, Debug)]
#[command(name = "colloquium", version, about, long_about = None)]
struct Cli {
    /// Research question to debate
    question: Option<String>,

    /// Generation model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Emit raw JSON event records instead of formatted output
    #[arg(long)]
    json: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default configuration file in the workspace
    Init,
    /// Show the effective configuration
    Show,
    /// Print the configuration file locations
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Resolve workspace
    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mut config = colloquium_core::config::load_config(Some(&workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    // Guard must outlive main so buffered file logs get flushed.
    let _guard = init_tracing(cli.verbose, cli.quiet, &config.log);

    // Handle subcommands
    if let Some(command) = cli.command {
        return commands::handle_command(command, &workspace).await;
    }

    let Some(question) = cli.question else {
        anyhow::bail!("no question given; run `colloquium \"<question>\"` or see --help");
    };

    // Apply CLI overrides
    if let Some(model) = &cli.model {
        config.generation.model = model.clone();
    }

    run::run_question(&question, config, cli.json).await
}

/// Set up tracing: human-readable stderr plus optional JSON file logging.
fn init_tracing(
    verbose: u8,
    quiet: bool,
    log: &LogConfig,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = match verbose {
        0 if quiet => "error".to_string(),
        0 => log.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };

    // Human-readable layer for stderr, leaving stdout to the event stream.
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    // JSON file layer for structured logging
    let (json_layer, guard) = if log.file {
        let log_dir = directories::ProjectDirs::from("org", "colloquium", "colloquium")
            .map(|d| d.data_dir().join("logs"))
            .unwrap_or_else(|| PathBuf::from("."));
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "colloquium.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_filter(EnvFilter::new("debug"));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    guard
}
