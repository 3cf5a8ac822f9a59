//! Configuration System using Figment
//!
//! Configuration is loaded from:
//! 1. `config/pixel_bridge.toml` (or an explicit path); a missing file is fine
//! 2. Environment variables prefixed with `PIXEL_BRIDGE_`, nested with `__`
//!
//! Every field has a default, so an empty configuration describes the
//! XIAO nRF54L15 board with a 60-element strip.
//!
//! # Environment Variable Overrides
//!
//! ```text
//! PIXEL_BRIDGE_APPLICATION__LOG_LEVEL=debug
//! PIXEL_BRIDGE_BOARD__MAX_LEDS=30
//! PIXEL_BRIDGE_RUNTIME__TABLE_CAPACITY=16
//! ```
//!
//! # Example
//!
//! ```no_run
//! use pixel_bridge::config::BridgeConfig;
//!
//! let config = BridgeConfig::load().unwrap();
//! println!("Board: {} ({} LEDs)", config.board.name, config.board.max_leds);
//! ```

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/pixel_bridge.toml";

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "PIXEL_BRIDGE_";

/// Largest strip a board may declare.
pub const MAX_SUPPORTED_LEDS: usize = 4096;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Figment could not read or merge a source.
    #[error("Configuration load error: {0}")]
    LoadError(#[from] Box<figment::Error>),
    /// A loaded value is out of range.
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BridgeConfig {
    /// Logging and naming.
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Script runtime limits.
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// The board whose strip `PIXELS` drives.
    #[serde(default)]
    pub board: BoardConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Embedded runtime settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Function-table slots available for native entries
    #[serde(default = "default_table_capacity")]
    pub table_capacity: usize,
    /// Script operation limit before execution is aborted
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,
}

/// Board definition: which class scripts see and how many elements exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Board identifier
    #[serde(default = "default_board_name")]
    pub name: String,
    /// Script-visible class name
    #[serde(default = "default_class_name")]
    pub class_name: String,
    /// Number of addressable LEDs
    #[serde(default = "default_max_leds")]
    pub max_leds: usize,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_log_level() -> String {
    "info".to_string()
}

fn default_table_capacity() -> usize {
    64
}

fn default_max_operations() -> u64 {
    100_000
}

fn default_board_name() -> String {
    "xiao-nrf54l15".to_string()
}

fn default_class_name() -> String {
    "PIXELS".to_string()
}

fn default_max_leds() -> usize {
    60
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            table_capacity: default_table_capacity(),
            max_operations: default_max_operations(),
        }
    }
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            name: default_board_name(),
            class_name: default_class_name(),
            max_leds: default_max_leds(),
        }
    }
}

impl BoardConfig {
    /// Board with the default class name and `max_leds` elements.
    pub fn with_leds(name: &str, max_leds: usize) -> Self {
        Self {
            name: name.to_string(),
            class_name: default_class_name(),
            max_leds,
        }
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl BridgeConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path merged with environment overrides.
    ///
    /// Precedence, highest first: environment, file, built-in defaults.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(Serialized::defaults(BridgeConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ConfigError::LoadError(Box::new(e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.runtime.table_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "runtime.table_capacity must be greater than 0".to_string(),
            ));
        }

        if self.runtime.max_operations == 0 {
            return Err(ConfigError::ValidationError(
                "runtime.max_operations must be greater than 0".to_string(),
            ));
        }

        self.board.validate()
    }
}

impl BoardConfig {
    /// Reject an empty name, a non-constant class name, and an LED count
    /// outside `1..=MAX_SUPPORTED_LEDS`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::ValidationError(
                "board.name cannot be empty".to_string(),
            ));
        }

        let valid_identifier = self
            .class_name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_uppercase())
            && self
                .class_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_identifier {
            return Err(ConfigError::ValidationError(format!(
                "Invalid board.class_name '{}'. Must be a constant identifier",
                self.class_name
            )));
        }

        if self.max_leds == 0 || self.max_leds > MAX_SUPPORTED_LEDS {
            return Err(ConfigError::ValidationError(format!(
                "Invalid board.max_leds {}. Must be 1-{}",
                self.max_leds, MAX_SUPPORTED_LEDS
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.board.class_name, "PIXELS");
        assert_eq!(config.board.max_leds, 60);
        assert_eq!(config.runtime.table_capacity, 64);
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = BridgeConfig::default();
        config.application.log_level = "loud".to_string();
        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Invalid log_level"));
    }

    #[test]
    fn test_invalid_board() {
        let mut config = BridgeConfig::default();
        config.board.max_leds = 0;
        assert!(config.validate().is_err());

        config.board.max_leds = MAX_SUPPORTED_LEDS + 1;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.board.class_name = "pixels".to_string();
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("class_name"));
    }

    #[test]
    fn test_zero_table_capacity() {
        let mut config = BridgeConfig::default();
        config.runtime.table_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        Jail::expect_with(|_jail| {
            let mut file = tempfile::NamedTempFile::new().map_err(|e| e.to_string())?;
            writeln!(
                file,
                r#"
[board]
name = "strip-8"
max_leds = 8

[runtime]
table_capacity = 4
"#
            )
            .map_err(|e| e.to_string())?;

            let config = BridgeConfig::load_from(file.path()).map_err(|e| e.to_string())?;
            assert_eq!(config.board.name, "strip-8");
            assert_eq!(config.board.max_leds, 8);
            assert_eq!(config.board.class_name, "PIXELS");
            assert_eq!(config.runtime.table_capacity, 4);
            assert_eq!(config.runtime.max_operations, 100_000);
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        Jail::expect_with(|_jail| {
            let config = BridgeConfig::load_from("does-not-exist.toml")
                .map_err(|e| e.to_string())?;
            assert_eq!(config, BridgeConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "pixel_bridge.toml",
                r#"
[board]
max_leds = 8
"#,
            )?;
            jail.set_env("PIXEL_BRIDGE_BOARD__MAX_LEDS", "30");
            jail.set_env("PIXEL_BRIDGE_APPLICATION__LOG_LEVEL", "debug");

            let config = BridgeConfig::load_from("pixel_bridge.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.board.max_leds, 30);
            assert_eq!(config.application.log_level, "debug");
            Ok(())
        });
    }

    #[test]
    fn test_invalid_file_value_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("pixel_bridge.toml", "[board]\nmax_leds = 0\n")?;
            let result = BridgeConfig::load_from("pixel_bridge.toml");
            assert!(matches!(result, Err(ConfigError::ValidationError(_))));
            Ok(())
        });
    }
}
