//! Config loader — reads `~/.tinyclaw/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.tinyclaw/config.json`
//! 3. Environment variables (override the file)

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::schema::{Config, ProviderConfig};
use crate::error::ConfigError;

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path + env vars.
///
/// A missing file yields defaults; an unparsable file is a startup error.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    let config = if config_path.exists() {
        debug!(path = %config_path.display(), "loading config");
        let content = std::fs::read_to_string(&config_path).map_err(|e| ConfigError::Io {
            path: config_path.display().to_string(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: config_path.display().to_string(),
            source: e,
        })?
    } else {
        info!(path = %config_path.display(), "no config file, using defaults");
        Config::default()
    };

    Ok(apply_env_overrides(config))
}

/// Save configuration to disk (pretty-printed JSON, camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&config_path, json)
}

/// Environment variables that override file settings.
///
/// Provider keys follow the `<NAME>_API_KEY` convention; a set key creates
/// the provider entry if the file lacks one.
fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(model) = std::env::var("TINYCLAW_MODEL") {
        config.agent.model = model;
    }
    if let Ok(workspace) = std::env::var("TINYCLAW_WORKSPACE") {
        config.agent.workspace = workspace;
    }
    if let Ok(key) = std::env::var("BRAVE_API_KEY") {
        config.tools.web_search_api_key = Some(key);
    }

    for (env, name) in [
        ("OPENAI_API_KEY", "openai"),
        ("OPENROUTER_API_KEY", "openrouter"),
        ("DEEPSEEK_API_KEY", "deepseek"),
        ("GROQ_API_KEY", "groq"),
        ("ZHIPU_API_KEY", "zhipu"),
    ] {
        if let Ok(key) = std::env::var(env) {
            if !key.is_empty() {
                config
                    .providers
                    .entry(name.to_string())
                    .or_insert_with(ProviderConfig::default)
                    .api_key = key;
            }
        }
    }

    if config.gateway.workers == 0 {
        warn!("gateway.workers was 0, clamping to 1");
        config.gateway.workers = 1;
    }

    config
}
