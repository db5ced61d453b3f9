//! Configuration for a party node

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Main node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Legal name of the local party
    #[serde(default = "default_party")]
    pub party: String,

    /// Record store configuration
    #[serde(default)]
    pub vault: VaultConfig,

    /// Protocol run configuration
    #[serde(default)]
    pub flow: FlowConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            party: default_party(),
            vault: VaultConfig::default(),
            flow: FlowConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Record store configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VaultConfig {
    /// Volatile in-memory index
    #[default]
    Memory,

    /// In-memory index backed by an append-only journal
    Journal {
        /// Journal file path
        path: PathBuf,
    },
}

/// Protocol run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Progress event buffer per subscriber
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Give up on signature collection after this many seconds. Unset waits
    /// indefinitely.
    #[serde(default)]
    pub collect_timeout_secs: Option<u64>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            event_capacity: default_event_capacity(),
            collect_timeout_secs: None,
        }
    }
}

impl FlowConfig {
    pub fn collect_timeout(&self) -> Option<Duration> {
        self.collect_timeout_secs.map(Duration::from_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_party() -> String {
    "PartyA".to_string()
}

fn default_event_capacity() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

impl NodeConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `ACCORD_`-prefixed environment variables (`ACCORD_FLOW__EVENT_CAPACITY`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&NodeConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("ACCORD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Configuration for `party` with everything else defaulted.
    pub fn for_party(party: impl Into<String>) -> Self {
        Self {
            party: party.into(),
            ..Default::default()
        }
    }
}
