use std::path::{Path, PathBuf};
use serde::Deserialize;
use anyhow::{Context, Result};
use shared::protocol::DEFAULT_SUPPORTED_PROTOCOLS;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub registrar: RegistrarConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrarConfig {
    /// Wire-protocol versions this registrar can speak
    #[serde(default = "default_supported_protocols")]
    pub supported_protocols: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_supported_protocols() -> Vec<u32> {
    DEFAULT_SUPPORTED_PROTOCOLS.to_vec()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/var/lib/registrard/registry.db")
}

fn default_listen() -> String {
    "[::]:8080".to_string()
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            supported_protocols: default_supported_protocols(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            db_path: default_db_path(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        if config.registrar.supported_protocols.is_empty() {
            anyhow::bail!("registrar.supported_protocols must not be empty");
        }

        Ok(config)
    }
}
