//! CLI parsing and command execution
//!
//! This module handles command-line argument parsing and routes commands to the appropriate handlers.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::backends::{KubeSecretStore, Store};
use crate::config::{Config, Settings};
use crate::rotation::{self, RotationEngine};
use crate::scheduler::Scheduler;
use crate::status::{self, RotationStats};

#[derive(Parser)]
#[command(name = "ksr")]
#[command(about = "Kubernetes secret rotator: periodically regenerates keys inside Secrets", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "ROTATOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Secrets to rotate: SECRET_NAME,NAMESPACE,KEY,STRATEGY[|SECRET_NAME,NAMESPACE,KEY,STRATEGY]
    #[arg(short, long, env = "ROTATOR_SECRETS")]
    pub secret: Option<String>,

    /// Rotation frequency, minutes (overrides config file)
    #[arg(short, long, env = "ROTATOR_FREQUENCY", allow_negative_numbers = true)]
    pub frequency: Option<i64>,

    /// Number of random characters drawn for each new value (overrides config file)
    #[arg(short, long, env = "ROTATOR_SECRET_LENGTH")]
    pub length: Option<usize>,

    /// Timeout for each Kubernetes API call, seconds (overrides config file)
    #[arg(long, env = "ROTATOR_API_TIMEOUT_SECS")]
    pub api_timeout: Option<u64>,

    /// Port for the status endpoint (overrides config file)
    #[arg(short, long, env = "ROTATOR_PORT")]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Rotate on a fixed interval and serve the status endpoint (default)
    Run,

    /// Run a single rotation pass and exit
    Once,

    /// Initialize a sample configuration file
    Init {
        /// Output path for the configuration file
        #[arg(short, long, default_value = "rotator-config.toml")]
        output: PathBuf,
    },

    /// Print one freshly generated secret value
    Generate,
}

impl Cli {
    /// Load the config file (if any) and apply command-line overrides
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("Failed to load config from {:?}", path))?,
            None => Config::default(),
        };

        if let Some(secret) = &self.secret {
            config.secrets = Some(secret.clone());
        }
        if let Some(frequency) = self.frequency {
            config.rotation.frequency_minutes = frequency;
        }
        if let Some(length) = self.length {
            config.rotation.secret_length = length;
        }
        if let Some(timeout) = self.api_timeout {
            config.rotation.api_timeout_seconds = timeout;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }

        Ok(config)
    }
}

/// Execute a CLI command
pub async fn execute(mut cli: Cli) -> Result<()> {
    let command = cli.command.take().unwrap_or(Commands::Run);

    // Handle commands that don't talk to the cluster first
    match &command {
        Commands::Init { output } => {
            Config::create_sample(output)
                .with_context(|| format!("Failed to create sample config at {:?}", output))?;
            info!("Sample configuration created at {:?}", output);
            return Ok(());
        }
        Commands::Generate => {
            let length = cli.length.unwrap_or(rotation::DEFAULT_SECRET_LENGTH);
            println!("{}", rotation::generate_secret(length));
            return Ok(());
        }
        Commands::Run | Commands::Once => {}
    }

    // Everything below is validated before the first API call
    let settings = cli
        .load_config()?
        .resolve()
        .context("Invalid rotator configuration")?;

    for target in &settings.targets {
        info!(
            namespace = %target.namespace,
            secret = %target.name,
            key = %target.key,
            strategy = target.strategy.as_flag(),
            "Rotating secret every {} minutes",
            settings.frequency_minutes
        );
    }

    let store: Store = Arc::new(
        KubeSecretStore::in_cluster(settings.api_timeout)
            .context("Failed to connect to the Kubernetes API")?,
    );
    let stats = Arc::new(RotationStats::new());
    let engine = RotationEngine::new(store, Arc::clone(&stats), settings.secret_length);

    match command {
        Commands::Once => {
            let summary = engine.run_pass(&settings.targets).await;
            println!(
                "Rotated {} secret(s): {} created, {} updated, {} skipped, {} failed",
                summary.rotations(),
                summary.created,
                summary.updated,
                summary.skipped,
                summary.failed
            );
            Ok(())
        }
        _ => run(settings, engine, stats).await,
    }
}

/// Run the rotation loop in the background and serve status until shutdown
async fn run(settings: Settings, engine: RotationEngine, stats: Arc<RotationStats>) -> Result<()> {
    let shutdown = CancellationToken::new();
    let scheduler = Scheduler::every_minutes(engine, settings.targets, settings.frequency_minutes);

    let rotation_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { scheduler.run(shutdown).await })
    };

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            shutdown.cancel();
        });
    }

    let served = status::start_server(settings.port, stats, shutdown.clone()).await;
    if let Err(e) = &served {
        error!("Status server exited: {:#}", e);
    }
    shutdown.cancel();

    match rotation_task.await {
        Ok(passes) => info!(passes, "Rotator stopped"),
        Err(e) => warn!("Rotation loop terminated abnormally: {}", e),
    }

    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ConfigError;

    const ENV_FALLBACKS: &[&str] = &[
        "ROTATOR_CONFIG",
        "ROTATOR_SECRETS",
        "ROTATOR_FREQUENCY",
        "ROTATOR_SECRET_LENGTH",
        "ROTATOR_API_TIMEOUT_SECS",
        "ROTATOR_PORT",
    ];

    /// Parse arguments with no environment fallbacks in effect
    fn parse(args: &[&str]) -> Cli {
        for name in ENV_FALLBACKS {
            std::env::remove_var(name);
        }
        Cli::try_parse_from(std::iter::once("ksr").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_every_env_fallback_is_cleared() {
        let cli = parse(&[]);
        assert!(cli.config.is_none());
        assert!(cli.secret.is_none());
        assert!(cli.frequency.is_none());
        assert!(cli.length.is_none());
        assert!(cli.api_timeout.is_none());
        assert!(cli.port.is_none());
    }

    #[test]
    fn test_defaults_to_run() {
        let cli = parse(&["--secret", "db,prod,password,retainPrev"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_overrides_apply_to_config() {
        let cli = parse(&[
            "--secret",
            "db,prod,password,retainPrev|api,prod,token,none",
            "--frequency",
            "15",
            "--port",
            "9090",
            "once",
        ]);
        assert!(matches!(cli.command, Some(Commands::Once)));

        let settings = cli.load_config().unwrap().resolve().unwrap();
        assert_eq!(settings.targets.len(), 2);
        assert_eq!(settings.frequency_minutes, 15);
        assert_eq!(settings.port, 9090);
    }

    #[test]
    fn test_negative_frequency_is_rejected_at_startup() {
        let cli = parse(&["--secret", "db,prod,password,none", "--frequency", "-1"]);
        let err = cli.load_config().unwrap().resolve().unwrap_err();
        assert_eq!(err, ConfigError::Frequency(-1));
    }

    #[tokio::test]
    async fn test_invalid_spec_fails_before_connecting() {
        let cli = parse(&["--secret", "db,prod,password"]);
        let err = execute(cli).await.unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[tokio::test]
    async fn test_init_writes_sample() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let output = temp_dir.path().join("rotator.toml");
        let cli = parse(&["init", "--output", output.to_str().unwrap()]);

        execute(cli).await.unwrap();
        assert!(Config::from_file(&output).unwrap().resolve().is_ok());
    }
}
