//! Configuration for the meshcfg daemon

use meshcfg_sink::AuthMode;
use meshcfg_source::RevisionFilter;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Main configuration, usually loaded from `meshcfg.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshcfgConfig {
    pub fs: FsConfig,
    pub sink: SinkConfig,
    /// Staged-rollout filter. Falls back to the environment when left empty.
    pub revision: RevisionFilter,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    /// Directory of YAML config files. Unset disables the filesystem source.
    pub root: Option<PathBuf>,
    pub watch: bool,
    pub default_namespace: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Listen address, e.g. `127.0.0.1:9901`. Unset disables the sink server.
    pub bind: Option<String>,
    pub id: String,
    /// Collections requested from peers. Empty requests every known collection.
    pub collections: Vec<String>,
    /// New streams admitted per second. Zero or less disables limiting.
    pub rate_limit: f64,
    pub burst: u32,
    pub auth_mode: AuthMode,
    pub allowed_identities: Vec<String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            bind: None,
            id: default_sink_id(),
            collections: Vec::new(),
            rate_limit: 0.0,
            burst: 10,
            auth_mode: AuthMode::AllowAll,
            allowed_identities: Vec::new(),
        }
    }
}

fn default_sink_id() -> String {
    "meshcfg".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub verbose: bool,
    pub log_to_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_to_file: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus textfile rewritten with the current counters. Unset disables it.
    pub textfile: Option<PathBuf>,
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            textfile: None,
            interval_secs: 15,
        }
    }
}

impl MeshcfgConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Read without validating, for callers that layer overrides on top.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: MeshcfgConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fs.root.is_none() && self.sink.bind.is_none() {
            return Err(ConfigError::Invalid(
                "nothing to run: set fs.root and/or sink.bind".to_string(),
            ));
        }
        if self.sink.auth_mode == AuthMode::Whitelist && self.sink.allowed_identities.is_empty() {
            return Err(ConfigError::Invalid(
                "sink.auth_mode = \"whitelist\" requires sink.allowed_identities".to_string(),
            ));
        }
        if self.metrics.textfile.is_some() && self.metrics.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "metrics.interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// The configured revision filter, or the one from the environment when none is set.
    pub fn revision_filter(&self) -> RevisionFilter {
        if self.revision == RevisionFilter::default() {
            RevisionFilter::from_env()
        } else {
            self.revision.clone()
        }
    }
}
