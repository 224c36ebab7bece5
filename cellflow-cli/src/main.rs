//! # cellflow CLI
//!
//! Command-line interface for the cellflow live evaluation engine.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ambox::Mailbox;
use cellflow_engine::block::plain;
use cellflow_engine::watch_and_eval_file;

#[derive(Parser)]
#[command(name = "cellflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a source file and stream evaluation updates as JSON
    Watch {
        /// File to watch
        file: PathBuf,

        /// Pretty-print JSON frames
        #[arg(long)]
        pretty: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Watch { file, pretty } => watch(file, pretty).await,
    }
}

/// Run the engine over `file` with the plain-text front-end, printing the
/// snapshot and then one JSON frame per flushed update.
async fn watch(file: PathBuf, pretty: bool) -> Result<()> {
    let engine = watch_and_eval_file(&file, plain::engine_config(), ())
        .await
        .with_context(|| format!("failed to start watching {}", file.display()))?;

    let (tx, mut updates) = tokio::sync::mpsc::unbounded_channel();
    let snapshot = engine.subscribe(Mailbox::from_sender(tx)).await;
    print_frame(&snapshot, pretty)?;

    eprintln!("Watching {} for changes (Ctrl+C to stop)...", file.display());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = updates.recv() => match update {
                Some(update) => print_frame(&update, pretty)?,
                None => break,
            },
        }
    }

    Ok(())
}

fn print_frame<T: serde::Serialize>(frame: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(frame)
    } else {
        serde_json::to_string(frame)
    }
    .context("failed to serialize update frame")?;
    println!("{json}");
    Ok(())
}
