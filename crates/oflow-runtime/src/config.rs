use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

fn default_driver_path() -> PathBuf {
    PathBuf::from("oftr")
}

fn default_exit_signals() -> Vec<String> {
    vec!["SIGTERM".to_string(), "SIGINT".to_string()]
}

/// One `OFP.LISTEN` call worth of configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct ListenEndpoint {
    pub endpoint: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub versions: Vec<u8>,
}

/// TLS material forwarded verbatim to the driver via `OFP.ADD_IDENTITY`.
#[derive(Clone, Debug, Deserialize)]
pub struct TlsMaterial {
    pub cert: PathBuf,
    pub cacert: PathBuf,
    pub privkey: PathBuf,
}

/// File form of a `Controller`'s construction parameters (§6), mirroring
/// the config-struct-plus-loader shape of the driver's own JSON-RPC config
/// surface.
#[derive(Clone, Debug, Deserialize)]
pub struct ControllerConfig {
    #[serde(default)]
    pub listen: Vec<ListenEndpoint>,
    #[serde(default)]
    pub tls: Option<TlsMaterial>,
    #[serde(default = "default_exit_signals")]
    pub exit_signals: Vec<String>,
    #[serde(default = "default_driver_path")]
    pub driver_path: PathBuf,
    #[serde(default)]
    pub debug: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            listen: Vec::new(),
            tls: None,
            exit_signals: default_exit_signals(),
            driver_path: default_driver_path(),
            debug: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ControllerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
