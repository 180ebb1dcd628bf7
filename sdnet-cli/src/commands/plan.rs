//! `sdnet plan`: attach a batch of workloads through one provider.
//!
//! Every entry runs concurrently, so entries sharing a network exercise the
//! create-or-wait path exactly as independent agents would.

use anyhow::{Context, Result};
use colored::Colorize;
use sdnet_core::{AttachmentService, Config, LocalDriver, SdnProvider};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tabled::{settings::Style, Table, Tabled};

const DEFAULT_AGENT: &str = "agent-0";

/// One attach request in a plan file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PlanEntry {
    pub workload: String,
    pub network: String,
    #[serde(default)]
    pub agent: Option<String>,
}

impl PlanEntry {
    fn agent_id(&self) -> &str {
        self.agent.as_deref().unwrap_or(DEFAULT_AGENT)
    }
}

/// Read a plan file.
pub fn load_plan(path: &Path) -> Result<Vec<PlanEntry>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan {}", path.display()))?;
    let entries: Vec<PlanEntry> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse plan {}", path.display()))?;
    Ok(entries)
}

#[derive(Tabled)]
struct AttachmentRow {
    #[tabled(rename = "WORKLOAD")]
    workload: String,
    #[tabled(rename = "NETWORK")]
    network: String,
    #[tabled(rename = "AGENT")]
    agent: String,
    #[tabled(rename = "ADDRESS")]
    address: String,
}

#[derive(Tabled)]
struct NetworkRow {
    #[tabled(rename = "NETWORK")]
    network: String,
    #[tabled(rename = "SUBNET")]
    subnet: String,
    #[tabled(rename = "STATE")]
    state: String,
}

/// Run a plan file and print the resulting attachments.
pub async fn plan(config: &Config, path: &Path) -> Result<()> {
    let entries = load_plan(path)?;
    if entries.is_empty() {
        println!("Plan is empty.");
        return Ok(());
    }

    let driver = Arc::new(LocalDriver::new());
    let provider = SdnProvider::local(config, driver.clone())?;

    let mut agents: HashMap<String, Arc<AttachmentService>> = HashMap::new();
    for entry in &entries {
        let agent_id = entry.agent_id();
        if !agents.contains_key(agent_id) {
            let service = provider.agent(agent_id, driver.clone())?;
            agents.insert(agent_id.to_string(), Arc::new(service));
        }
    }

    tracing::info!("Running plan: {} attachments across {} agents", entries.len(), agents.len());

    let handles: Vec<_> = entries
        .iter()
        .map(|entry| {
            let service = agents[entry.agent_id()].clone();
            let entry = entry.clone();
            tokio::spawn(async move {
                let result = service.attach(&entry.workload, &entry.network).await;
                (entry, result)
            })
        })
        .collect();

    let mut rows = Vec::with_capacity(handles.len());
    let mut failures = 0;
    for handle in handles {
        let (entry, result) = handle.await.context("Attach task panicked")?;
        let address = match result {
            Ok(attachment) => attachment.address.to_string().green().to_string(),
            Err(e) => {
                failures += 1;
                format!("error: {}", e).red().to_string()
            }
        };
        rows.push(AttachmentRow {
            agent: entry.agent_id().to_string(),
            workload: entry.workload,
            network: entry.network,
            address,
        });
    }

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);
    println!();

    let mut network_rows = Vec::new();
    for (network_id, range) in provider.pool().allocations()? {
        let state = provider.coordinator().state(&network_id).await?;
        network_rows.push(NetworkRow {
            network: network_id,
            subnet: range.to_string(),
            state: state.to_string(),
        });
    }
    let mut table = Table::new(network_rows);
    table.with(Style::rounded());
    println!("{}", table);

    if failures > 0 {
        anyhow::bail!("{} of {} attachments failed", failures, entries.len());
    }
    println!("{} {} workloads attached", "✓".green().bold(), entries.len());
    Ok(())
}
