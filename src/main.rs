//! # pdfrag CLI
//!
//! Ingest documents into a persisted vector index and ask questions about
//! them, from the terminal or over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! pdfrag --config ./config/pdfrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pdfrag ingest <paths…>` | Extract, chunk, embed and index files or directories |
//! | `pdfrag ask "<question>"` | Answer one question |
//! | `pdfrag chat` | Interactive conversation with follow-up rewriting |
//! | `pdfrag status` | Show index and provider status |
//! | `pdfrag serve` | Start the HTTP API |
//!
//! Logging is controlled by `RUST_LOG` (default `pdf_rag=info`) and goes
//! to stderr.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pdf_rag::{commands, config, server};

/// Chat with your documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/pdfrag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "pdfrag",
    about = "Chat with your documents: retrieval-augmented answers over PDFs, DOCX and text",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pdfrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest files or directories into the index.
    ///
    /// Directories are walked recursively; only .pdf, .docx, .txt and .md
    /// files are picked up. If any file fails to extract, nothing is indexed.
    Ingest {
        /// Files or directories to ingest.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Ask a single question.
    Ask {
        question: String,
        /// Print the retrieved chunks used to answer.
        #[arg(long)]
        sources: bool,
    },

    /// Start an interactive chat session.
    ///
    /// Follow-up questions are rewritten into standalone questions using the
    /// conversation so far. History is discarded when the session ends.
    Chat {
        #[arg(long)]
        sources: bool,
    },

    /// Show index size, embedder and language model.
    Status,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pdf_rag=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest { paths } => {
            commands::run_ingest(&cfg, &paths).await?;
        }
        Commands::Ask { question, sources } => {
            commands::run_ask(&cfg, &question, sources).await?;
        }
        Commands::Chat { sources } => {
            commands::run_chat(&cfg, sources).await?;
        }
        Commands::Status => {
            commands::run_status(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
