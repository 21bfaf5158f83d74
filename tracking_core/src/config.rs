//! Host configuration, read from TOML.

use crate::tracking::{AnalysisOptions, LinkOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Environment variable naming a configuration file
pub const CONFIG_ENV_VAR: &str = "PARTICLE_TRACKING_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub plugins: PluginsConfig,
    pub tracking: LinkOptions,
    pub analysis: AnalysisOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Extra manifests loaded at start-up
    pub manifests: Vec<PathBuf>,
    /// Refuse manifests whose callables are not bound
    pub strict_entry_points: bool,
    /// Register the bundled Particle Tracking plugin
    pub builtin: bool,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            manifests: Vec::new(),
            strict_entry_points: true,
            builtin: true,
        }
    }
}

impl HostConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("Reading config: {:?}", path);
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Load from an explicit path, else from `PARTICLE_TRACKING_CONFIG`,
    /// else defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
        match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}
