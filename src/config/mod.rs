//! Configuration file loading and parsing.
//!
//! This module handles loading the configuration file from disk and parsing
//! it into validated, type-safe structures.
//!
//! # Configuration File Locations
//!
//! The configuration file is searched in the following order:
//!
//! 1. Path given as the first CLI argument
//! 2. Default location:
//!    - **Linux/macOS:** `~/.xcode-tools-mcp/config.json`
//!    - **Windows:** `%USERPROFILE%\.xcode-tools-mcp\config.json`
//!
//! An explicitly named file must exist. When the default file is absent the
//! built-in defaults are used.

mod settings;

pub use settings::{BuildConfig, Config, DiscoveryConfig, LoggingConfig, MAX_DISCOVERY_DEPTH};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.xcode-tools-mcp/`
/// - **Windows:** `%USERPROFILE%\.xcode-tools-mcp\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".xcode-tools-mcp"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Returns the path of the selection state file for `config`.
///
/// Falls back to `state.json` in the working directory when no home
/// directory can be determined.
#[must_use]
pub fn state_path(config: &Config) -> PathBuf {
    config.state_path.clone().unwrap_or_else(|| {
        default_config_dir().map_or_else(|| PathBuf::from("state.json"), |dir| dir.join("state.json"))
    })
}

/// Loads and parses the configuration file.
///
/// If `path` is `None`, uses the platform-specific default location and
/// falls back to defaults when that file does not exist.
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly given configuration file cannot be found
/// - The file cannot be read
/// - The JSON is malformed
/// - Required fields are missing or invalid
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::NotFound {
                    path: p.to_path_buf(),
                });
            }
            p.to_path_buf()
        }
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            _ => {
                let config = Config::default();
                config.validate()?;
                return Ok(config);
            }
        },
    };

    let contents = std::fs::read_to_string(&config_path).map_err(|e| ConfigError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;

    let config: Config = serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: config_path.clone(),
        source: e,
    })?;

    // Validate the configuration
    config.validate()?;

    Ok(config)
}
