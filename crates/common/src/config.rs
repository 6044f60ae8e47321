use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Wire protocol constants
pub mod protocol {
    /// Current protocol version, written as `v` in every message
    pub const VERSION: u64 = 0;

    /// Maximum size of a single link-layer frame (2^15 bytes)
    pub const MAX_LINK_MSG_SIZE: usize = 32768;

    /// Maximum encoded size of a signed IntroSet
    pub const MAX_INTROSET_SIZE: usize = 4096;

    /// Maximum size of an on-disk service key file
    pub const MAX_KEYFILE_SIZE: usize = 256;

    /// Maximum number of frames queued for a peer without a session
    pub const MAX_OUTBOUND_QUEUE: usize = 1024;
}

/// DHT constants
pub mod dht {
    /// Recursion budget attached to a fresh client lookup
    pub const DEFAULT_RECURSION: u64 = 5;

    /// Upper bound on the recursion budget accepted from the wire
    pub const MAX_RECURSION: u64 = 8;

    /// Number of contacts returned to an iterative lookup
    pub const ITERATIVE_CONTACTS: usize = 4;

    /// How long a relayed lookup waits for the next hop's reply
    pub const RELAYED_TX_TIMEOUT_MS: u64 = 10_000;

    /// Maximum number of IntroSets kept in local storage
    pub const MAX_STORED_INTROSETS: usize = 10_000;
}

/// Hidden service constants
pub mod service {
    /// Default lookup timeout
    pub const LOOKUP_TIMEOUT_MS: u64 = 5000;

    /// Address suffix for hidden services
    pub const ADDRESS_SUFFIX: &str = ".mesh";
}

/// Node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Data directory
    pub data_dir: String,

    /// Router identity key file, relative to the data directory
    pub identity_keyfile: String,

    /// Number of worker threads for crypto and disk jobs
    pub worker_threads: usize,

    /// Interval between router ticks
    pub tick_interval_ms: u64,

    /// Timeout applied to hidden service lookups
    pub lookup_timeout_ms: u64,

    /// Hidden service definitions, if any
    pub services_file: Option<String>,

    /// Enable verbose logging
    pub verbose: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            identity_keyfile: "identity.key".to_string(),
            worker_threads: 2,
            tick_interval_ms: 1000,
            lookup_timeout_ms: service::LOOKUP_TIMEOUT_MS,
            services_file: None,
            verbose: false,
        }
    }
}

impl NodeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_dir(mut self, dir: String) -> Self {
        self.data_dir = dir;
        self
    }

    pub fn with_worker_threads(mut self, workers: usize) -> Self {
        self.worker_threads = workers;
        self
    }

    pub fn with_services_file(mut self, file: String) -> Self {
        self.services_file = Some(file);
        self
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Full path of the router identity key file
    pub fn identity_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join(&self.identity_keyfile)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::WriteError(e.to_string()))?;

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Failed to serialize config: {0}")]
    SerializeError(String),

    #[error("Failed to write config file: {0}")]
    WriteError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.lookup_timeout_ms, service::LOOKUP_TIMEOUT_MS);
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert!(config.services_file.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = NodeConfig::new()
            .with_data_dir("/tmp/data".to_string())
            .with_worker_threads(4)
            .with_services_file("services.toml".to_string());

        assert_eq!(config.worker_threads, 4);
        assert_eq!(config.identity_path(), PathBuf::from("/tmp/data/identity.key"));
        assert_eq!(config.services_file.as_deref(), Some("services.toml"));
    }

    #[test]
    fn test_config_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");

        let config = NodeConfig::new().with_worker_threads(3);
        config.to_file(&path).unwrap();

        let loaded = NodeConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(&path, "verbose = true\n").unwrap();

        let loaded = NodeConfig::from_file(&path).unwrap();
        assert!(loaded.verbose);
        assert_eq!(loaded.worker_threads, 2);
    }
}
