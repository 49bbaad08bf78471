//! panel.toml configuration parser.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fleetpanel_state::{NodeRecord, WorkloadAllocation};
use serde::Deserialize;
use thiserror::Error;

use crate::duration::parse_duration;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration for {field}: {value:?}")]
    Duration { field: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PanelConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    /// Node records upserted into the inventory at startup.
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    /// Committed workload allocations upserted at startup.
    #[serde(default)]
    pub allocations: Vec<WorkloadAllocation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    /// Time between scheduled poll cycles.
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Upper bound for a single agent request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
    /// Workload-list endpoint under `/api/` on the agent.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Skip TLS certificate verification for self-signed agent certificates.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Cap on concurrent agent requests. Defaults to one per node.
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            request_timeout: default_request_timeout(),
            endpoint: default_endpoint(),
            accept_invalid_certs: false,
            max_concurrency: None,
        }
    }
}

fn default_listen_port() -> u16 {
    8443
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/fleetpanel")
}

fn default_interval() -> String {
    "30s".to_string()
}

fn default_request_timeout() -> String {
    "5s".to_string()
}

fn default_endpoint() -> String {
    "servers".to_string()
}

impl PollerConfig {
    pub fn interval(&self) -> Result<Duration, ConfigError> {
        positive_duration("poller.interval", &self.interval)
    }

    pub fn request_timeout(&self) -> Result<Duration, ConfigError> {
        positive_duration("poller.request_timeout", &self.request_timeout)
    }
}

fn positive_duration(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match parse_duration(value) {
        Some(d) if !d.is_zero() => Ok(d),
        _ => Err(ConfigError::Duration {
            field,
            value: value.to_string(),
        }),
    }
}

impl PanelConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse and validate a config document.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: PanelConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.poller.interval()?;
        self.poller.request_timeout()?;

        let endpoint = self.poller.endpoint.trim_matches('/');
        if endpoint.is_empty() {
            return Err(ConfigError::Invalid("poller.endpoint is empty".to_string()));
        }
        if self.poller.max_concurrency == Some(0) {
            return Err(ConfigError::Invalid(
                "poller.max_concurrency must be at least 1".to_string(),
            ));
        }

        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id) {
                return Err(ConfigError::Invalid(format!("duplicate node id {}", node.id)));
            }
            node.validate()
                .map_err(|reason| ConfigError::Invalid(format!("node {}: {reason}", node.id)))?;
        }
        for allocation in &self.allocations {
            if !ids.contains(&allocation.node_id) {
                return Err(ConfigError::Invalid(format!(
                    "allocation {} references unknown node {}",
                    allocation.workload_id, allocation.node_id
                )));
            }
        }
        Ok(())
    }
}
