//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::StrobeConfig;
use std::path::Path;

/// Loads and validates a `strobe.toml` configuration file.
pub fn load_config(path: &Path) -> Result<StrobeConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Parses and validates a configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<StrobeConfig, ConfigError> {
    let config: StrobeConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that configuration values are usable and consistent.
fn validate_config(config: &StrobeConfig) -> Result<(), ConfigError> {
    if config.session.testbench_top.is_empty() {
        return Err(ConfigError::ValidationError(
            "session.testbench_top must not be empty".to_string(),
        ));
    }
    if config.server.socket.is_empty() {
        return Err(ConfigError::ValidationError(
            "server.socket must not be empty".to_string(),
        ));
    }
    for (i, pin) in config.bench.pins.iter().enumerate() {
        if pin.is_empty() {
            return Err(ConfigError::ValidationError(
                "bench pin names must not be empty".to_string(),
            ));
        }
        if config.bench.pins[..i].contains(pin) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate pin name '{pin}'"
            )));
        }
    }
    for net in &config.bench.nets {
        if net.name.is_empty() {
            return Err(ConfigError::ValidationError(
                "bench net names must not be empty".to_string(),
            ));
        }
        if net.width == 0 {
            return Err(ConfigError::ValidationError(format!(
                "net '{}' must be at least one bit wide",
                net.name
            )));
        }
    }
    Ok(())
}
