use reqwest::Url;
use std::{
    net::{SocketAddr, ToSocketAddrs},
    path::PathBuf,
    time::Duration,
};

use super::config_file::{read_config, ConfigToml};

/// Used when neither the command line nor the config file name an address.
pub const DEFAULT_ADDRESS: &str = ":5354";

/// Upstream timeout in seconds if none is configured.
pub const DEFAULT_TIMEOUT_SECS: i64 = 10;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}. {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file. {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid listen address `{0}`.")]
    InvalidAddress(String),

    #[error("Invalid upstream url `{url}`. {reason}")]
    InvalidUpstream { url: String, reason: String },

    #[error("No upstream configured. Add at least one with -upstream <url>.")]
    NoUpstream,
}

/// Values given on the command line. They win over the config file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub address: Option<String>,
    pub upstreams: Vec<String>,
    pub timeout: Option<i64>,
    pub verbose: bool,
    pub config: Option<PathBuf>,
}

/**
 * Immutable application configuration. Built once at startup
 * and handed to the socket.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub address: SocketAddr,
    pub upstreams: Vec<Url>,
    /// Deadline for a single upstream call. `None` waits forever.
    pub timeout: Option<Duration>,
    pub verbose: bool,
}

impl AppConfig {
    /// Reads the config file if one is given and merges the command line on top.
    pub fn load(cli: CliOverrides) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => read_config(path)?,
            None => ConfigToml::default(),
        };
        Self::merge(cli, file)
    }

    fn merge(cli: CliOverrides, file: ConfigToml) -> Result<Self, ConfigError> {
        let general = file.general;

        let address = cli
            .address
            .or(general.address)
            .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());
        let address = parse_listen_addr(&address)?;

        let upstreams = if cli.upstreams.is_empty() {
            general.upstreams
        } else {
            cli.upstreams
        };
        if upstreams.is_empty() {
            return Err(ConfigError::NoUpstream);
        }
        let upstreams = upstreams
            .iter()
            .map(|url| parse_upstream(url.as_str()))
            .collect::<Result<Vec<_>, _>>()?;

        let timeout = timeout_from_secs(cli.timeout.or(general.timeout).unwrap_or(DEFAULT_TIMEOUT_SECS));

        Ok(Self {
            address,
            upstreams,
            timeout,
            verbose: cli.verbose || general.verbose,
        })
    }
}

/// Parses `host:port`, `[v6]:port` or `:port`. The port-only form listens on all interfaces.
pub fn parse_listen_addr(value: &str) -> Result<SocketAddr, ConfigError> {
    let value = value.trim();
    let full = match value.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => value.to_string(),
    };

    if let Ok(addr) = full.parse::<SocketAddr>() {
        return Ok(addr);
    }

    // Host names like `localhost:53`.
    full.to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ConfigError::InvalidAddress(value.to_string()))
}

fn parse_upstream(value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::InvalidUpstream {
        url: value.to_string(),
        reason: e.to_string(),
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUpstream {
            url: value.to_string(),
            reason: format!("Unsupported scheme {}.", url.scheme()),
        });
    }
    Ok(url)
}

/// Zero or negative seconds disable the deadline.
pub fn timeout_from_secs(secs: i64) -> Option<Duration> {
    if secs <= 0 {
        return None;
    }
    Some(Duration::from_secs(secs as u64))
}
