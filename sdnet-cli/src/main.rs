use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sdnet_core::Config;
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "sdnet")]
#[command(about = "Subnet allocation and network provisioning for SDN overlays", long_about = None)]
struct Cli {
    /// Path to config.json (defaults to $SDNET_CONFIG or the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Attach every workload listed in a plan file, concurrently
    Plan {
        /// Path to the plan (JSON list of {workload, network, agent?})
        file: PathBuf,
    },

    /// Provision a network directly
    Provision {
        /// Network ID
        network: String,

        /// Explicit subnet (e.g., "10.10.7.0/24")
        #[arg(long)]
        cidr: Option<String>,
    },

    /// Show the subnet pool layout
    Pool,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    config.context("Failed to load configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    sdnet_core::init_observability(&config.observability)
        .map_err(|e| anyhow::anyhow!("Failed to initialize observability: {}", e))?;

    match cli.command {
        Commands::Plan { file } => commands::plan(&config, &file).await?,
        Commands::Provision { network, cidr } => {
            commands::provision(&config, &network, cidr.as_deref()).await?
        }
        Commands::Pool => commands::pool(&config)?,
    }

    Ok(())
}
