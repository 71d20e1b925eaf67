//! Adapter configuration.
//!
//! One TOML file lists the database instances the adapter may poll, plus
//! logging and cache settings:
//!
//! ```toml
//! [logging]
//! level = "debug"
//!
//! [instances.sdb_prod]
//! info = "production coord"
//! [instances.sdb_prod.connect]
//! host = "10.0.0.1"
//! service = 11810
//! [instances.sdb_prod.flag]
//! coord = true
//! ```

use crate::error::{Result, SdbError};
use sdb_rest_protocol::REST_PORT_OFFSET;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "ZBX_SDB_CONFIG";
pub const CONFIG_FILE_NAME: &str = "zbx_sdb.toml";
const USER_CONFIG_RELATIVE_PATH: &str = "zbx-sdb/config.toml";
pub const UNKNOWN_INFO: &str = "UNKNOW";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub instances: BTreeMap<String, InstanceConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct CacheConfig {
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct InstanceConfig {
    #[serde(default = "default_info")]
    pub info: String,
    pub connect: ConnectConfig,
    /// Discovery flags; `discovery_inst <flag>` lists instances with it set.
    #[serde(default)]
    pub flag: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ConnectConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_service")]
    pub service: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub rest_port: Option<u16>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl ConnectConfig {
    /// Port of the REST gateway, `service + 4` unless set explicitly.
    pub fn rest_port(&self) -> u16 {
        self.rest_port
            .unwrap_or_else(|| self.service.saturating_add(REST_PORT_OFFSET))
    }
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            service: default_service(),
            user: String::new(),
            password: String::new(),
            rest_port: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_info() -> String {
    UNKNOWN_INFO.to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_service() -> u16 {
    11810
}

fn default_timeout_ms() -> u64 {
    5000
}

impl Config {
    pub fn instance(&self, name: &str) -> Result<&InstanceConfig> {
        self.instances
            .get(name)
            .ok_or_else(|| SdbError::UnknownInstance(name.to_string()))
    }
}

/// Candidate config locations, most specific first.
pub fn config_search_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    if let Some(path) = explicit {
        return vec![path.to_path_buf()];
    }
    if let Ok(path) = env::var(CONFIG_ENV) {
        if !path.trim().is_empty() {
            return vec![PathBuf::from(path)];
        }
    }

    let mut paths = Vec::new();
    if let Some(dir) = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        paths.push(dir.join(CONFIG_FILE_NAME));
    }
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join(USER_CONFIG_RELATIVE_PATH));
    }
    paths
}

/// Loads the first existing config from [`config_search_paths`].
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let candidates = config_search_paths(explicit);
    let path = candidates
        .iter()
        .find(|path| path.exists())
        .ok_or_else(|| {
            SdbError::ConfigNotFound(
                candidates
                    .iter()
                    .map(|path| path.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            )
        })?;
    load_config_from(path)
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    let content = fs_err::read_to_string(path).map_err(|source| SdbError::Io {
        context: "Failed to read configuration".to_string(),
        source,
    })?;
    parse_config(&content).map_err(|details| SdbError::ConfigMalformed {
        path: path.to_path_buf(),
        details,
    })
}

pub fn parse_config(content: &str) -> std::result::Result<Config, String> {
    toml::from_str::<Config>(content).map_err(|err| err.to_string())
}
