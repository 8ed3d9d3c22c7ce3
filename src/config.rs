use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Seconds between ticks.
    pub interval_secs: u64,
    /// How long to sample, e.g. `10s`, `5m`.
    pub duration: String,
    /// Print every process row after each tick.
    pub verbose: bool,
    /// `sysinfo` or `procfs`.
    pub child_source: String,
    /// Kill the tree when sampling stops. Unset means only a workload we
    /// started is killed.
    pub terminate_on_stop: Option<bool>,
    pub proc_root: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            interval_secs: 1,
            duration: "10s".to_string(),
            verbose: false,
            child_source: "sysinfo".to_string(),
            terminate_on_stop: None,
            proc_root: PathBuf::from("/proc"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// `text` or `json`.
    pub format: String,
    /// `pid`, `cpu`, `memory` or `name`.
    pub sort: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            format: "text".to_string(),
            sort: "pid".to_string(),
        }
    }
}

impl GeneralConfig {
    /// Whether to terminate the tree on stop; an attached process is left
    /// running unless the config says otherwise.
    pub fn should_terminate(&self, attached: bool) -> bool {
        self.terminate_on_stop.unwrap_or(!attached)
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("treewatch").join("config.toml"))
}

pub fn load_config() -> Config {
    match config_path() {
        Some(path) if path.exists() => load_config_from_path(&path),
        _ => Config::default(),
    }
}

pub fn load_config_from_path(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "invalid config, using defaults");
                Config::default()
            }
        },
        Err(_) => Config::default(),
    }
}
