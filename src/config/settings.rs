//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::ConfigError;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    pub _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    pub _comment: Option<String>,

    /// Directories searched for Xcode projects, workspaces and Swift packages.
    ///
    /// Empty means the current working directory.
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,

    /// Location of the persisted selection state file.
    ///
    /// Defaults to `state.json` next to the default configuration file.
    #[serde(default)]
    pub state_path: Option<PathBuf>,

    /// Project discovery settings.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Build and run settings.
    #[serde(default)]
    pub build: BuildConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.build.timeout_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "build.timeout_secs must be greater than zero".to_string(),
            });
        }

        if self.build.output_tail_bytes > self.build.max_output_bytes {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "build.output_tail_bytes ({}) cannot exceed build.max_output_bytes ({})",
                    self.build.output_tail_bytes, self.build.max_output_bytes
                ),
            });
        }

        if !(1..=MAX_DISCOVERY_DEPTH).contains(&self.discovery.max_depth) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "discovery.max_depth must be between 1 and {MAX_DISCOVERY_DEPTH}, got {}",
                    self.discovery.max_depth
                ),
            });
        }

        if self.build.default_configuration.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "build.default_configuration cannot be empty".to_string(),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            });
        }

        Ok(())
    }
}

/// Upper bound on how deep project discovery may descend.
pub const MAX_DISCOVERY_DEPTH: usize = 8;

/// Project discovery configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// How many directory levels are inspected, counting each search path
    /// itself as the first.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Directory names that are never descended into.
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            ignore: default_ignore(),
        }
    }
}

const fn default_max_depth() -> usize {
    3
}

fn default_ignore() -> Vec<String> {
    ["Pods", ".build", "DerivedData", "node_modules", "Carthage", ".git"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

/// Build and run configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Wall-clock limit for a single `xcodebuild` invocation, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum bytes of output retained per stream while a command runs.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    /// Bytes of output embedded in tool results.
    #[serde(default = "default_output_tail_bytes")]
    pub output_tail_bytes: usize,

    /// Build configuration used when none is selected.
    #[serde(default = "default_configuration")]
    pub default_configuration: String,

    /// Optional `-derivedDataPath` passed to `xcodebuild`.
    #[serde(default)]
    pub derived_data_path: Option<PathBuf>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_output_bytes: default_max_output_bytes(),
            output_tail_bytes: default_output_tail_bytes(),
            default_configuration: default_configuration(),
            derived_data_path: None,
        }
    }
}

const fn default_timeout_secs() -> u64 {
    900
}

const fn default_max_output_bytes() -> usize {
    4 * 1024 * 1024
}

const fn default_output_tail_bytes() -> usize {
    16 * 1024
}

fn default_configuration() -> String {
    "Debug".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let json = r"{}";
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert!(config.search_paths.is_empty());
        assert!(config.state_path.is_none());
        assert_eq!(config.build.default_configuration, "Debug");
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "_comment": "Test config",
            "search_paths": ["/Users/dev/Projects"],
            "state_path": "/tmp/xcode-state.json",
            "discovery": {
                "max_depth": 2,
                "ignore": ["Pods"]
            },
            "build": {
                "timeout_secs": 120,
                "max_output_bytes": 65536,
                "output_tail_bytes": 4096,
                "default_configuration": "Release",
                "derived_data_path": "/tmp/dd"
            },
            "logging": {
                "level": "debug"
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.search_paths, vec![PathBuf::from("/Users/dev/Projects")]);
        assert_eq!(config.state_path, Some(PathBuf::from("/tmp/xcode-state.json")));
        assert_eq!(config.discovery.max_depth, 2);
        assert_eq!(config.discovery.ignore, vec!["Pods".to_string()]);
        assert_eq!(config.build.timeout_secs, 120);
        assert_eq!(config.build.output_tail_bytes, 4096);
        assert_eq!(config.build.default_configuration, "Release");
        assert_eq!(config.build.derived_data_path, Some(PathBuf::from("/tmp/dd")));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn build_config_defaults() {
        let config = BuildConfig::default();
        assert_eq!(config.timeout_secs, 900);
        assert_eq!(config.max_output_bytes, 4 * 1024 * 1024);
        assert_eq!(config.output_tail_bytes, 16 * 1024);
        assert!(config.derived_data_path.is_none());
    }

    #[test]
    fn discovery_config_defaults() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.max_depth, 3);
        assert!(config.ignore.iter().any(|d| d == "Pods"));
        assert!(config.ignore.iter().any(|d| d == "DerivedData"));
    }

    #[test]
    fn logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "warn");
    }

    #[test]
    fn reject_zero_timeout() {
        let json = r#"{ "build": { "timeout_secs": 0 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_tail_larger_than_buffer() {
        let json = r#"{ "build": { "max_output_bytes": 100, "output_tail_bytes": 200 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_excessive_depth() {
        let json = r#"{ "discovery": { "max_depth": 20 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_invalid_log_level() {
        let json = r#"{ "logging": { "level": "verbose" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_unknown_fields() {
        let json = r#"{
            "unknown_field": "value"
        }"#;

        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
