//! Implementations of the `pdfrag` subcommands.
//!
//! Each `run_*` function builds what it needs from the loaded [`Config`] and
//! prints its result to stdout. Diagnostics go through `tracing` to stderr.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use walkdir::WalkDir;

use crate::config::Config;
use crate::extract::is_supported;
use crate::llm::LlmSelection;
use crate::models::{ConversationTurn, QueryOutcome, SourceDocument};
use crate::pipeline::RagPipeline;

async fn build_pipeline(config: &Config) -> Result<RagPipeline> {
    let selection = LlmSelection::from_env(&config.llm);
    tracing::debug!(?selection, "resolved language model");
    Ok(RagPipeline::from_config(config, &selection).await?)
}

/// Expand `paths` into the files to ingest.
///
/// Directories are walked recursively and only supported file types are
/// kept. Files named explicitly are always included, so an unsupported one
/// is reported by the extractor instead of being silently skipped.
pub fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| p.file_name().and_then(|n| n.to_str()).is_some_and(is_supported))
                .collect();
            found.sort();
            files.extend(found);
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            bail!("No such file or directory: {}", path.display());
        }
    }
    Ok(files)
}

pub async fn run_ingest(config: &Config, paths: &[PathBuf]) -> Result<()> {
    let files = collect_files(paths)?;
    if files.is_empty() {
        println!("No supported files found.");
        return Ok(());
    }

    let mut documents = Vec::with_capacity(files.len());
    for file in &files {
        documents.push(SourceDocument::from_path(file).await?);
    }

    let pipeline = build_pipeline(config).await?;
    let summary = pipeline
        .ingest(documents)
        .await
        .context("Ingest failed; the index was not modified")?;

    println!("{}", summary.message());
    println!("  chunks indexed: {}", summary.chunks_indexed);
    println!("  index: {}", pipeline.store().path().display());
    Ok(())
}

fn print_outcome(outcome: &QueryOutcome, show_sources: bool) {
    println!("{}", outcome.answer);
    if show_sources && !outcome.sources.is_empty() {
        println!();
        println!("Sources:");
        for (i, s) in outcome.sources.iter().enumerate() {
            println!("  {}. {} (page {}, score {:.3})", i + 1, s.filename, s.page, s.score);
        }
    }
}

pub async fn run_ask(config: &Config, question: &str, show_sources: bool) -> Result<()> {
    let pipeline = build_pipeline(config).await?;
    let outcome = pipeline.answer(question, &[]).await?;
    print_outcome(&outcome, show_sources);
    Ok(())
}

/// Interactive loop. History lives only for the duration of the session.
pub async fn run_chat(config: &Config, show_sources: bool) -> Result<()> {
    let pipeline = build_pipeline(config).await?;
    let mut history: Vec<ConversationTurn> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Ask a question about your documents. Type 'exit' to quit.");
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "exit" || question == "quit" {
            break;
        }

        match pipeline.answer(question, &history).await {
            Ok(outcome) => {
                print_outcome(&outcome, show_sources);
                history.push(ConversationTurn::user(question));
                history.push(ConversationTurn::assistant(outcome.answer));
            }
            Err(e) => eprintln!("Error: {}", e),
        }
    }
    Ok(())
}

pub async fn run_status(config: &Config) -> Result<()> {
    let pipeline = build_pipeline(config).await?;
    let stats = pipeline.store().stats().await;
    let dims = stats
        .dims
        .map(|d| d.to_string())
        .unwrap_or_else(|| "-".to_string());

    println!("Index:     {}", display_path(pipeline.store().path()));
    println!("Entries:   {}", stats.entries);
    println!("Documents: {}", stats.documents);
    println!("Dims:      {}", dims);
    println!("Metric:    {}", stats.metric);
    println!(
        "Embedder:  {} ({})",
        config.embedding.provider,
        pipeline.embedder().model_name()
    );
    println!("LLM:       {}", pipeline.llm_provider());
    Ok(())
}

fn display_path(path: &Path) -> String {
    if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (not created yet)", path.display())
    }
}
