//! # docchat CLI
//!
//! ```bash
//! docchat --config ./config/docchat.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docchat serve` | Start the HTTP server |
//! | `docchat ask "<message>"` | Run one conversation turn and print the answer |
//! | `docchat ingest <path>` | Index a local document |
//! | `docchat delete <filename>` | Remove a document's vectors |
//! | `docchat prompt show\|set\|sync` | Inspect or update the system instructions |
//! | `docchat title "<message>"` | Generate a chat title |
//! | `docchat completions <shell>` | Print shell completions |
//!
//! Logs go to stderr (`RUST_LOG`, default `info`); command output goes to stdout.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use docchat::app::Services;
use docchat::config::{self, Config};
use docchat::server;
use docchat_core::{ConversationTurn, Role};

/// docchat: conversational question answering over your own documents.
///
/// All commands except `completions` read a TOML configuration file. See
/// `config/docchat.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "docchat", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Run one conversation turn and print the answer.
    Ask {
        message: String,
        /// JSON file with prior turns: `[{"role": "user", "content": "..."}]`.
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Extract, chunk, and index a local file.
    Ingest { path: PathBuf },

    /// Delete every vector indexed from `filename`.
    Delete { filename: String },

    /// Inspect or update the system instructions.
    Prompt {
        #[command(subcommand)]
        action: PromptAction,
    },

    /// Generate a short title for a chat that starts with `message`.
    Title { message: String },

    /// Print shell completions to stdout.
    Completions { shell: Shell },
}

#[derive(Subcommand)]
enum PromptAction {
    /// Print the current instructions.
    Show,
    /// Replace the instructions.
    Set { text: String },
    /// Force a refresh from the remote store and print the result.
    Sync,
}

#[derive(Deserialize)]
struct HistoryEntry {
    #[serde(default)]
    role: String,
    content: String,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn load_history(path: &Path) -> Result<Vec<ConversationTurn>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file: {}", path.display()))?;
    let entries: Vec<HistoryEntry> =
        serde_json::from_str(&content).with_context(|| "Failed to parse history file")?;
    Ok(entries
        .into_iter()
        .map(|e| ConversationTurn::new(Role::parse_lenient(&e.role), e.content))
        .collect())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "docchat", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing();
    let cfg: Config = config::load_config(&cli.config)?;

    if let Commands::Serve = cli.command {
        return server::run_server(&cfg).await;
    }

    let services = Services::from_config(&cfg)?;

    match cli.command {
        Commands::Ask { message, history } => {
            let history = match history {
                Some(path) => load_history(&path)?,
                None => Vec::new(),
            };
            let result = services.orchestrator().run_turn(&message, &history).await;
            println!("{}", result.answer_text);
            if result.used_context {
                println!();
                println!("(answered from indexed documents)");
            }
        }
        Commands::Ingest { path } => {
            let report = services.ingestor().ingest_path(&path).await?;
            println!("ingest {}", report.filename);
            println!("  type: {}", report.file_type);
            println!("  bytes: {}", report.file_size);
            println!("  chunks: {}", report.chunk_count);
            println!("ok");
        }
        Commands::Delete { filename } => {
            services.ingestor().delete_document(&filename).await?;
            println!("deleted vectors for '{}'", filename);
        }
        Commands::Prompt { action } => {
            let cache = services.instructions();
            match action {
                PromptAction::Show => println!("{}", cache.get(false).await),
                PromptAction::Set { text } => {
                    let receipt = cache.set(&text).await?;
                    if let Some(warning) = receipt.warning {
                        eprintln!("warning: {}", warning);
                    }
                    println!("System prompt updated (persisted: {})", receipt.persisted);
                }
                PromptAction::Sync => {
                    let resolved = cache.resolve(true).await;
                    if let Some(e) = resolved.remote_error {
                        eprintln!("warning: {}", e);
                    }
                    println!("source: {}", resolved.tier.as_str());
                    println!("{}", resolved.value);
                }
            }
        }
        Commands::Title { message } => {
            let title = services.synthesizer().generate_title(&message).await?;
            println!("{}", title);
        }
        Commands::Serve | Commands::Completions { .. } => {}
    }

    Ok(())
}
