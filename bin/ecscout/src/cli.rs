use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "ecscout")]
#[command(
    author,
    version,
    about = "Prometheus service discovery sidecar for Amazon ECS"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "ECSCOUT_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the discovery loop until Ctrl+C.
    Run(RunArgs),
    /// Parse and validate a discovery config, then exit.
    Validate(ValidateArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Path to the discovery config YAML.
    #[arg(long, alias = "conf", env = "ECSCOUT_CONFIG")]
    pub config: PathBuf,

    /// Path to a JSON snapshot of decorated tasks, re-read on every tick.
    ///
    /// Stands in for an orchestrator API client: an external process keeps
    /// the snapshot current and changes show up at the next tick.
    #[arg(long, env = "ECSCOUT_SNAPSHOT")]
    pub snapshot: PathBuf,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Path to the discovery config YAML.
    #[arg(long, alias = "conf", env = "ECSCOUT_CONFIG")]
    pub config: PathBuf,
}
