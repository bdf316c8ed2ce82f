use serde::Deserialize;
use std::{fs, path::Path};

use super::app_config::ConfigError;

/// Optional configuration file. Every value can be overridden on the command line.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ConfigToml {
    #[serde(default)]
    pub general: General,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct General {
    /// Listen address like `127.0.0.1:53` or `:5354`.
    #[serde(default)]
    pub address: Option<String>,

    /// DoH json api urls in the order they are tried.
    #[serde(default)]
    pub upstreams: Vec<String>,

    /// Upstream timeout in seconds. Zero or negative disables the deadline.
    #[serde(default)]
    pub timeout: Option<i64>,

    #[serde(default)]
    pub verbose: bool,
}

impl ConfigToml {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

/// Read the prodoh config file.
pub fn read_config(path: &Path) -> Result<ConfigToml, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ConfigToml::from_toml(&content)
}
