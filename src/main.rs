//! Main binary entrypoint for hype-runner.
//!
//! Parses CLI arguments, loads the config, sets up logging, and walks the
//! corpus.

use clap::Parser;
use hype_runner::{Config, Result, corpus};
use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

#[derive(Parser)]
#[command(name = "hype-runner")]
#[command(about = "Energy and CPU-profile benchmarking over planning problem corpora")]
struct Cli {
    #[arg(long, help = "Path to the JSON (or .toml) configuration file")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse input
    let cli = Cli::parse();

    let config = Config::load(&cli.config);

    // Toggle the tracing level
    let verbose = config.as_ref().is_ok_and(|c| c.verbose);
    if verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    };

    // Listen to CTRL+C
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    let shutdown_task = tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for CTRL+C: {e}");
            return;
        }
        tracing::info!("Received CTRL+C. Initiating graceful shutdown...");
        r.store(false, Ordering::SeqCst);
    });

    let result = corpus::run(config, &running).await;

    if !running.load(Ordering::SeqCst) {
        let _ = shutdown_task.await;
        tracing::info!("Shutdown complete");
    } else {
        shutdown_task.abort();
    }

    // If the run results in an error, print and exit
    if let Err(e) = result {
        tracing::error!("{e}");

        std::process::exit(1);
    }

    Ok(())
}
