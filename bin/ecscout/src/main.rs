//! ecscout is a sidecar that discovers Prometheus scrape targets on an ECS
//! cluster and publishes them as a file_sd document.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Commands, RunArgs, ValidateArgs};
use ecscout_discovery::{Config, ServiceDiscovery, SnapshotFetcher};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Validate(args) => validate(args),
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let config = Config::load_from_file(&args.config)?;
    tracing::info!(
        config = %args.config.display(),
        snapshot = %args.snapshot.display(),
        cluster = %config.cluster_name,
        result_file = %config.result_file.display(),
        "starting discovery"
    );

    let sd = ServiceDiscovery::new(config, SnapshotFetcher::new(args.snapshot))?;
    sd.run_and_write_file(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {err}");
        }
        tracing::info!("received shutdown signal");
    })
    .await
}

fn validate(args: ValidateArgs) -> Result<()> {
    let mut config = Config::load_from_file(&args.config)?;
    config.init().context("invalid discovery config")?;
    tracing::info!(
        cluster = %config.cluster_name,
        services = config.services.len(),
        task_definitions = config.task_definitions.len(),
        docker_labels = config.docker_labels.len(),
        "config is valid"
    );
    Ok(())
}
