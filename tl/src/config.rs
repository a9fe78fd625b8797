//! trialloop configuration
//!
//! A small YAML file with three optional keys:
//!
//! ```yaml
//! seed: 42            # fixed RNG seed for `tl run` / `tl sequence`
//! flush-input: false  # skip draining the keyboard before each loop
//! log-level: debug    # used when neither --log-level nor RUST_LOG is set
//! ```

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Project-local config file name, looked up in the working directory
pub const LOCAL_CONFIG: &str = ".trialloop.yml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `seed`: seeds the experiment RNG, so trial order and `=random...`
    /// cycle values repeat between runs; absent means OS entropy
    pub seed: Option<u64>,

    /// `flush-input`: whether a loop drains pending key presses before its
    /// first trial
    #[serde(rename = "flush-input")]
    pub flush_input: bool,

    /// `log-level`: tracing filter directive such as `info` or `trialloop=trace`
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed: None,
            flush_input: true,
            log_level: None,
        }
    }
}

impl Config {
    /// Load the configuration for one `tl` invocation
    ///
    /// A `--config` path is authoritative: it must exist and parse. Without
    /// it the [`Config::search_paths`] are tried in order and the first file
    /// that parses wins; a broken file is skipped with a warning so a stale
    /// user config never blocks running a script.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        debug!(?config_path, "Config::load: called");
        if let Some(path) = config_path {
            return Self::load_from_file(path).wrap_err_with(|| format!("Failed to load config from {}", path.display()));
        }

        for path in Self::search_paths().into_iter().filter(|p| p.exists()) {
            match Self::load_from_file(&path) {
                Ok(config) => return Ok(config),
                Err(e) => warn!(path = %path.display(), error = %e, "Config::load: skipping config file"),
            }
        }

        debug!("Config::load: no config file, using defaults");
        Ok(Self::default())
    }

    /// Where [`Config::load`] looks without `--config`: `.trialloop.yml` in
    /// the working directory, then `trialloop/trialloop.yml` under the
    /// platform config dir
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG)];
        paths.extend(dirs::config_dir().map(|dir| dir.join("trialloop").join("trialloop.yml")));
        paths
    }

    /// Read just the log level, before logging is set up
    ///
    /// Any problem reading the config yields `None`; the full
    /// [`Config::load`] reports it once logging is running.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|c| c.log_level)
    }

    /// Write the config as YAML with the same kebab-case keys it is read with
    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml).wrap_err_with(|| format!("Failed to write config to {}", path.display()))
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let yaml = fs::read_to_string(path).wrap_err("Failed to read config file")?;
        let config = serde_yaml::from_str(&yaml).wrap_err("Failed to parse config file")?;
        debug!(path = %path.display(), "Config::load_from_file: loaded");
        Ok(config)
    }
}
