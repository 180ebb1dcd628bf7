//! `sdnet provision`: create a network without the create-or-wait protocol.

use anyhow::{Context, Result};
use colored::Colorize;
use sdnet_core::{AddressRange, Config, LocalDriver, SdnProvider};
use std::sync::Arc;

const CLI_AGENT: &str = "cli";

/// Provision a network, optionally on an explicit subnet.
pub async fn provision(config: &Config, network_id: &str, cidr: Option<&str>) -> Result<()> {
    let explicit = cidr
        .map(|c| c.parse::<AddressRange>())
        .transpose()
        .with_context(|| format!("Invalid subnet {}", cidr.unwrap_or_default()))?;

    let driver = Arc::new(LocalDriver::new());
    let provider = SdnProvider::local(config, driver.clone())?;
    let agent = provider.agent(CLI_AGENT, driver)?;

    let network = agent
        .provision(network_id, explicit)
        .await
        .with_context(|| format!("Failed to provision network {}", network_id))?;

    let range = provider
        .pool()
        .lookup(&network)?
        .map(|r| r.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!("{} Network provisioned: {} ({})", "✓".green().bold(), network.bold(), range);
    Ok(())
}
