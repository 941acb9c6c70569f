// src/config/file.rs
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{RelayError, Result};

pub const ENV_CONFIG_PATH: &str = "RELAY_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/relay.toml";

/// Optional TOML layer. Every field may be omitted; env vars override it.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    pub bot_token: Option<String>,
    pub channel_id: Option<String>,
    pub telegram_api_base: Option<String>,
    pub port: Option<u16>,
    pub monitor_interval_secs: Option<u64>,
    pub cursor_path: Option<PathBuf>,
    pub request_timeout_secs: Option<u64>,
    pub telegram_retries: Option<u8>,
    pub pacing_min_ms: Option<u64>,
    pub pacing_max_ms: Option<u64>,
    pub fallback_cap: Option<usize>,
    pub missing_coupon_means_free: Option<bool>,
    /// Priority order; sources not listed are disabled.
    pub sources: Option<Vec<String>>,
    /// Per-source overrides, keyed by source id.
    pub source: BTreeMap<String, SourceFileConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourceFileConfig {
    pub pages: Option<usize>,
    pub fallback_cap: Option<usize>,
    pub initial_limit: Option<usize>,
    pub base_url: Option<String>,
    pub max_posts: Option<usize>,
    pub request_delay_ms: Option<u64>,
}

/// Parse a config file from an explicit path.
pub fn load_from(path: &Path) -> Result<FileConfig> {
    let content = fs::read_to_string(path).map_err(|e| {
        RelayError::config(format!("reading config from {}: {e}", path.display()))
    })?;
    parse(&content)
        .map_err(|e| RelayError::config(format!("parsing config {}: {e}", path.display())))
}

/// Locate the config file:
/// 1) `$RELAY_CONFIG_PATH` (must exist)
/// 2) `config/relay.toml`
/// 3) none → empty config
pub fn load_default() -> Result<FileConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_from(&pb);
        }
        return Err(RelayError::config(format!(
            "{ENV_CONFIG_PATH} points to non-existent path {}",
            pb.display()
        )));
    }
    let default = PathBuf::from(DEFAULT_CONFIG_PATH);
    if default.exists() {
        return load_from(&default);
    }
    Ok(FileConfig::default())
}

pub fn parse(s: &str) -> Result<FileConfig> {
    Ok(toml::from_str(s)?)
}
