//! Configuration loading.
//!
//! Settings are JSON documents deserialized into [`EngineConfig`]; every
//! omitted section falls back to its defaults except `costs`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use stockcast_engine::EngineConfig;

/// Environment variable naming a config file for [`load_from_env`].
pub const CONFIG_PATH_ENV: &str = "STOCKCAST_CONFIG";

pub fn load_from_str(raw: &str) -> Result<EngineConfig> {
    let config: EngineConfig = serde_json::from_str(raw).context("parsing engine config")?;
    config.validate().context("validating engine config")?;
    Ok(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<EngineConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    load_from_str(&raw).with_context(|| format!("loading {}", path.display()))
}

/// Load the file named by `STOCKCAST_CONFIG`.
pub fn load_from_env() -> Result<EngineConfig> {
    let path = std::env::var(CONFIG_PATH_ENV)
        .with_context(|| format!("{CONFIG_PATH_ENV} is not set"))?;
    load_from_path(path)
}
