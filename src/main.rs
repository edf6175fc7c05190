//! Kubernetes Secret Rotator CLI
//!
//! This is the main entry point for the CLI application.

use anyhow::{anyhow, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use kube_secret_rotator::cli;

#[tokio::main]
async fn main() -> Result<()> {
    // The Kubernetes client needs a process-wide rustls provider
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Execute the command
    cli::execute(cli).await
}
