//! CLI configuration handling.
//!
//! Settings are layered: `config.toml` (platform config dir or `--config`),
//! then `TOKENWARDEN_*` environment variables, then command-line flags.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokenwarden_core::AuthConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
    /// Token manager settings (`[auth]` table).
    #[serde(default)]
    pub auth: AuthConfig,

    /// Logging level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: PathBuf,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            auth: AuthConfig::default(),
            log_level: default_log_level(),
            config_path: PathBuf::new(),
        }
    }
}

/// Load configuration from `path` or the default location, then apply
/// environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<CliConfig> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path(),
    };

    let mut config = load_config_file(&config_path)?;
    config.auth = config
        .auth
        .apply_env()
        .context("Failed to apply TOKENWARDEN_* environment overrides")?;

    Ok(config)
}

/// Read a configuration file, falling back to defaults if it does not exist.
pub fn load_config_file(config_path: &Path) -> Result<CliConfig> {
    let mut config = if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config from {:?}", config_path))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", config_path))?
    } else {
        CliConfig::default()
    };

    config.config_path = config_path.to_path_buf();
    Ok(config)
}

/// `config.toml` in the platform config directory.
pub fn default_config_path() -> PathBuf {
    project_dirs()
        .map(|d| d.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("tokenwarden.toml"))
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "raibid-labs", "tokenwarden")
}
