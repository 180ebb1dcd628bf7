//! Configuration management.

use crate::error::{Result, SdnError};
use crate::types::AddressRange;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the configuration file location.
pub const CONFIG_ENV: &str = "SDNET_CONFIG";

/// Persistent configuration for sdnet.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub pool: PoolConfig,
    pub provisioning: ProvisioningConfig,
    pub observability: ObservabilityConfig,
}

/// Address space the subnet pool and agent allocator draw from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    /// Superset range that network subnets are cut from
    pub superset: String,
    /// Prefix length of each network subnet
    pub block_prefix: u8,
    /// Range SDN agent addresses are handed out from
    pub agent_cidr: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            superset: "10.10.0.0/16".to_string(),
            block_prefix: 24,
            agent_cidr: "10.9.0.0/16".to_string(),
        }
    }
}

impl PoolConfig {
    pub fn superset_range(&self) -> Result<AddressRange> {
        self.superset.parse().map_err(|e| SdnError::InvalidConfig {
            reason: format!("pool.superset: {}", e),
        })
    }

    pub fn agent_range(&self) -> Result<AddressRange> {
        self.agent_cidr.parse().map_err(|e| SdnError::InvalidConfig {
            reason: format!("pool.agent_cidr: {}", e),
        })
    }
}

/// Wait policy for network creation and discovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// How often a losing caller checks whether the network is ready
    pub poll_interval_secs: u64,
    /// How long a losing caller waits before giving up
    pub wait_timeout_secs: u64,
    /// How long the winning caller waits for the new network to report running
    pub startup_timeout_secs: u64,
    /// How often the winning caller checks the running state
    pub running_poll_interval_secs: u64,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            wait_timeout_secs: 60,
            startup_timeout_secs: 120,
            running_poll_interval_secs: 1,
        }
    }
}

impl ProvisioningConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn running_poll_interval(&self) -> Duration {
        Duration::from_secs(self.running_poll_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log directive, overridden by `RUST_LOG`
    pub log_level: String,
    /// Port for the Prometheus scrape endpoint (disabled when unset)
    pub metrics_port: Option<u16>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string(), metrics_port: None }
    }
}

impl Config {
    /// Get the path to the configuration file.
    ///
    /// Resolution order:
    /// 1. `SDNET_CONFIG` environment variable
    /// 2. `<config dir>/sdnet/config.json`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("sdnet")
            .join("config.json")
    }

    /// Load configuration from the default location, falling back to defaults.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load and validate configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SdnError::IoError { path: path.to_path_buf(), source: e })?;
        let config: Config = serde_json::from_str(&content).map_err(|e| SdnError::InvalidConfig {
            reason: format!("Failed to parse config {}: {}", path.display(), e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to disk.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SdnError::IoError { path: parent.to_path_buf(), source: e })?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| SdnError::InvalidConfig {
            reason: format!("Failed to serialize config: {}", e),
        })?;
        std::fs::write(path, content)
            .map_err(|e| SdnError::IoError { path: path.to_path_buf(), source: e })
    }

    /// Check ranges, prefixes and intervals.
    pub fn validate(&self) -> Result<()> {
        let superset = self.pool.superset_range()?;
        self.pool.agent_range()?;

        if self.pool.block_prefix < superset.prefix_len() || self.pool.block_prefix > 30 {
            return Err(SdnError::InvalidConfig {
                reason: format!(
                    "pool.block_prefix must be between /{} and /30, got /{}",
                    superset.prefix_len(),
                    self.pool.block_prefix
                ),
            });
        }

        let p = &self.provisioning;
        if p.poll_interval_secs == 0 || p.running_poll_interval_secs == 0 {
            return Err(SdnError::InvalidConfig {
                reason: "poll intervals must be greater than zero".to_string(),
            });
        }
        if p.wait_timeout_secs < p.poll_interval_secs {
            return Err(SdnError::InvalidConfig {
                reason: format!(
                    "provisioning.wait_timeout_secs ({}) is shorter than poll_interval_secs ({})",
                    p.wait_timeout_secs, p.poll_interval_secs
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.provisioning.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.provisioning.wait_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "pool": { "superset": "172.20.0.0/22" } }"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.pool.superset, "172.20.0.0/22");
        assert_eq!(config.pool.block_prefix, 24);
        assert_eq!(config.provisioning, ProvisioningConfig::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.provisioning.wait_timeout_secs = 90;
        config.observability.metrics_port = Some(9464);
        config.save(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_rejects_bad_prefix() {
        let mut config = Config::default();
        config.pool.block_prefix = 12;
        assert!(matches!(config.validate(), Err(SdnError::InvalidConfig { .. })));

        config.pool.block_prefix = 31;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_intervals() {
        let mut config = Config::default();
        config.provisioning.poll_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.provisioning.wait_timeout_secs = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unparseable_superset() {
        let mut config = Config::default();
        config.pool.superset = "10.10.0.0".to_string();
        assert!(matches!(config.validate(), Err(SdnError::InvalidConfig { .. })));
    }
}
