//! `sdnet pool`: show how the configured pool is carved up.

use anyhow::Result;
use sdnet_core::{AddressRange, Config, SubnetPool};
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct PoolRow {
    #[tabled(rename = "SUPERSET")]
    superset: String,
    #[tabled(rename = "BLOCK")]
    block: String,
    #[tabled(rename = "BLOCKS")]
    blocks: u64,
    #[tabled(rename = "FIRST")]
    first: String,
    #[tabled(rename = "AGENT CIDR")]
    agent_cidr: String,
}

fn layout(config: &Config) -> Result<PoolRow> {
    config.validate()?;
    let pool = SubnetPool::from_config(&config.pool)?;
    let first = AddressRange::new(pool.superset().network(), pool.block_prefix())?;

    Ok(PoolRow {
        superset: pool.superset().to_string(),
        block: format!("/{}", pool.block_prefix()),
        blocks: pool.total_blocks(),
        first: first.to_string(),
        agent_cidr: config.pool.agent_range()?.to_string(),
    })
}

/// Print the pool layout.
pub fn pool(config: &Config) -> Result<()> {
    let mut table = Table::new(vec![layout(config)?]);
    table.with(Style::rounded());
    println!("{}", table);
    Ok(())
}
