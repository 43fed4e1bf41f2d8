//! Application configuration.
//!
//! Reads the `[store]` section from `config/default.toml` (or the file given
//! with `--config`). Precedence, lowest first: built-in defaults, the config
//! file, the `KEYHOLD_DB` environment variable, the `--db` flag.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use keyhold_store::StoreConfig;
use serde::Deserialize;
use tracing::debug;

/// Environment variable overriding the database path.
pub const DB_ENV_VAR: &str = "KEYHOLD_DB";

/// Top-level layout of the config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AppConfig {
    store: StoreConfig,
}

/// Parse config file contents.
pub fn parse(content: &str) -> Result<StoreConfig> {
    let app: AppConfig = toml::from_str(content).context("invalid config file")?;
    Ok(app.store)
}

/// Load the store configuration from `path` and apply overrides.
///
/// A missing file is not an error; defaults are used instead.
pub fn load(path: &Path, db_flag: Option<PathBuf>) -> Result<StoreConfig> {
    let config = match std::fs::read_to_string(path) {
        Ok(content) => {
            debug!(path = %path.display(), "loading config file");
            parse(&content).with_context(|| format!("in {}", path.display()))?
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no config file, using defaults");
            StoreConfig::default()
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", path.display()));
        }
    };

    let env_db = std::env::var(DB_ENV_VAR).ok().filter(|v| !v.is_empty());
    Ok(apply_overrides(config, env_db, db_flag))
}

/// Apply the environment and command-line path overrides.
fn apply_overrides(
    mut config: StoreConfig,
    env_db: Option<String>,
    db_flag: Option<PathBuf>,
) -> StoreConfig {
    if let Some(path) = env_db {
        config.path = PathBuf::from(path);
    }
    if let Some(path) = db_flag {
        config.path = path;
    }
    config
}
