use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use catalog::{IgnoreItem, ScanOptions, DEFAULT_SKIP_MARKER};
use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub version: u32,
    pub locations: Vec<String>,
    pub store_path: String,
    pub watch_hidden: bool,
    pub skip_marker: String,
    pub ignore_items: Vec<IgnoreItem>,
    pub watch_music: bool,
    pub watch_debounce_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            locations: Vec::new(),
            store_path: "catalog.redb".to_string(),
            watch_hidden: false,
            skip_marker: DEFAULT_SKIP_MARKER.to_string(),
            ignore_items: Vec::new(),
            watch_music: true,
            watch_debounce_secs: 2,
        }
    }
}

impl ServiceConfig {
    pub fn scan_options(&self) -> ScanOptions {
        let skip_marker = if self.skip_marker.trim().is_empty() {
            DEFAULT_SKIP_MARKER.to_string()
        } else {
            self.skip_marker.clone()
        };
        ScanOptions {
            watch_hidden: self.watch_hidden,
            skip_marker,
            ignore: self.ignore_items.clone(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("OSTINATO_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        Err(_) => PathBuf::from("config.yaml"),
    }
}

pub fn load_or_create_config(path: &Path) -> Result<(ServiceConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: ServiceConfig = serde_yaml::from_str(&contents)?;
        if config.version < CONFIG_VERSION {
            config.version = CONFIG_VERSION;
        }
        config.locations.retain(|location| !location.trim().is_empty());
        if config.skip_marker.trim().is_empty() {
            config.skip_marker = DEFAULT_SKIP_MARKER.to_string();
        }
        return Ok((config, false));
    }

    let config = ServiceConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

pub fn save_config(path: &Path, config: &ServiceConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value);
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}
