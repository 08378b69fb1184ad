use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Run configuration, loaded from a YAML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the per-year sales CSV exports.
    pub data_dir: PathBuf,
    /// Path of the DuckDB database file.
    pub db_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("data"),
            db_path: PathBuf::from("mrts.duckdb"),
        }
    }
}

/// Load configuration from `path` if given, else from `./mrtsetl.yaml` if it
/// exists, else fall back to the defaults.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let candidate = match path {
        Some(p) => p.to_path_buf(),
        None => PathBuf::from("mrtsetl.yaml"),
    };

    if !candidate.is_file() {
        if path.is_some() {
            anyhow::bail!("config file {:?} not found", candidate);
        }
        info!("no config file; using defaults");
        return Ok(Config::default());
    }

    let text = fs::read_to_string(&candidate)
        .with_context(|| format!("reading config file {:?}", candidate))?;
    let cfg: Config = serde_yaml::from_str(&text)
        .with_context(|| format!("parsing config file {:?}", candidate))?;
    info!(config = %candidate.display(), "loaded config");
    Ok(cfg)
}
