//! Config file loading

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use kubesift_analysis::{InsightConfig, PatternSet};
use kubesift_logs::CollectorConfig;

/// Contents of `config.toml`; every section is optional
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub retrieval: CollectorConfig,
    pub insight: InsightConfig,
    pub patterns: PatternSet,
}

impl Config {
    /// `~/.kubesift/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        let home = dirs::home_dir()?;
        Some(home.join(".kubesift").join("config.toml"))
    }

    /// Load an explicit file, or the default file if it exists
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content).context(format!("Invalid config file {}", path.display()))
    }
}
