//! Configuration loading.
//!
//! Reads `config.toml` (by default `~/.config/vizor/config.toml`), then lets
//! the process environment override individual values. A missing file is
//! not an error: every setting has a default.

use std::path::{Path, PathBuf};
use vizor_core::config::VizorConfig;
use vizor_core::{Result, VizorError};

const APP_DIR: &str = "vizor";
const CONFIG_FILE: &str = "config.toml";

/// Loads [`VizorConfig`] from disk and environment.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: Option<PathBuf>,
}

impl ConfigService {
    /// Uses `path` if given, otherwise the default location.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path: path.or_else(Self::default_path),
        }
    }

    /// `~/.config/vizor/config.toml`, if a config directory exists.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// File, then environment, then validation.
    pub fn load(&self) -> Result<VizorConfig> {
        self.load_with_env(|key| std::env::var(key).ok())
    }

    /// Same as [`ConfigService::load`] with an explicit environment lookup.
    pub fn load_with_env<F>(&self, lookup: F) -> Result<VizorConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match &self.path {
            Some(path) => Self::read_file(path)?,
            None => VizorConfig::default(),
        };
        config.apply_env_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<VizorConfig> {
        match std::fs::read_to_string(path) {
            Ok(content) => VizorConfig::from_toml_str(&content).map_err(|e| {
                VizorError::config(format!("Failed to parse {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(
                    target: "vizor::config",
                    "[Config] {} not found, using defaults",
                    path.display()
                );
                Ok(VizorConfig::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for ConfigService {
    fn default() -> Self {
        Self::new(None)
    }
}
