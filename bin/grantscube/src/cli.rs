use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "grantscube")]
#[command(
    author,
    version,
    about = "Deploy the GrantsCube contracts to an EVM network"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "GRANTSCUBE_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a Grantscube.toml configuration file, or a directory containing one.
    ///
    /// If not provided, ./Grantscube.toml is used when present.
    #[arg(short, long, env = "GRANTSCUBE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Name of the network to deploy to, as configured under `[networks]`.
    #[arg(short, long, env = "GRANTSCUBE_NETWORK")]
    pub network: Option<String>,

    /// Root of the compiler output (Hardhat `artifacts/` directory).
    #[arg(long, env = "GRANTSCUBE_ARTIFACTS")]
    pub artifacts: Option<PathBuf>,

    /// Directory the deployment record is written to.
    #[arg(long, env = "GRANTSCUBE_OUTDATA")]
    pub outdata: Option<PathBuf>,

    /// Validate the compiler profile, artifacts and plan, print the plan, and exit
    /// without contacting the network.
    #[arg(long, env = "GRANTSCUBE_DRY_RUN", default_value_t = false)]
    pub dry_run: bool,
}
