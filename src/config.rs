use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::blockchain::pow::DEFAULT_DIFFICULTY;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "LEDGER_CONFIG";

/// Configuration file read when `LEDGER_CONFIG` is not set
pub const DEFAULT_CONFIG_PATH: &str = "config/node.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Could not parse {0}: {1}")]
    Parse(PathBuf, toml::de::Error),
}

/// Node configuration, mapped from a TOML file. Every field is optional.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct NodeConfig {
    /// Address the HTTP server binds to
    pub host: String,

    /// Port the HTTP server binds to
    pub port: u16,

    /// Directory of the sled database
    pub data_dir: PathBuf,

    /// Keep the chain in memory only
    pub in_memory: bool,

    /// Leading zero hex characters required from a proof
    pub difficulty: usize,

    /// Amount paid to this node for each mined block
    pub mining_reward: u64,

    /// Upper bound on any single request to a peer
    pub peer_timeout_secs: u64,

    /// Peers registered on startup
    pub bootstrap_peers: Vec<String>,

    /// Identifier credited with mining rewards; random when absent
    pub node_id: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            host: "127.0.0.1".to_string(),
            port: 5000,
            data_dir: PathBuf::from("data/blockchain"),
            in_memory: false,
            difficulty: DEFAULT_DIFFICULTY,
            mining_reward: 1,
            peer_timeout_secs: 5,
            bootstrap_peers: Vec::new(),
            node_id: None,
        }
    }
}

impl NodeConfig {
    /// Loads the configuration from `LEDGER_CONFIG`, falling back to
    /// `config/node.toml`, falling back to defaults when neither exists
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;

        toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_timeout_secs)
    }
}
