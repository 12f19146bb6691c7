//! Configuration system
//!
//! File-backed settings for the ECS core. Any `Config` type can be loaded
//! from or saved to TOML or RON, picked by file extension.

use std::path::Path;

pub use serde::{Serialize, Deserialize};

use crate::ecs::id::MAX_COMPONENT_SLOTS;
use crate::ecs::handle::MAX_HANDLES;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from a `.toml` or `.ron` file
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let contents = std::fs::read_to_string(path)?;

        match format {
            ConfigFormat::Toml => toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            ConfigFormat::Ron => ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
        }
    }

    /// Save configuration to a `.toml` or `.ron` file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match ConfigFormat::from_path(path)? {
            ConfigFormat::Toml => toml::to_string_pretty(self)
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
            ConfigFormat::Ron => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
        };

        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Toml,
    Ron,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("ron") => Ok(Self::Ron),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value failed validation
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// # ECS Configuration
///
/// Initial capacities and growth steps for the entity handle table and the
/// component managers, plus the default log filter used by hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcsConfig {
    /// Initial number of entity handle slots
    pub entity_capacity: usize,
    /// Minimum number of entity slots added when the handle table grows
    pub entity_expand_size: usize,
    /// Initial number of slots in every component manager
    pub component_capacity: usize,
    /// Minimum number of slots added when a component manager grows
    pub component_expand_size: usize,
    /// Default `env_logger` filter (e.g. "info", "scene_engine=debug")
    pub log_level: String,
}

impl Default for EcsConfig {
    fn default() -> Self {
        Self {
            entity_capacity: 1024,
            entity_expand_size: 1024,
            component_capacity: 256,
            component_expand_size: 256,
            log_level: "info".to_string(),
        }
    }
}

impl EcsConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial entity capacity
    #[must_use]
    pub fn with_entity_capacity(mut self, capacity: usize) -> Self {
        self.entity_capacity = capacity;
        self
    }

    /// Set the initial per-manager component capacity
    #[must_use]
    pub fn with_component_capacity(mut self, capacity: usize) -> Self {
        self.component_capacity = capacity;
        self
    }

    /// Set both growth steps
    #[must_use]
    pub fn with_expand_sizes(mut self, entity_expand_size: usize, component_expand_size: usize) -> Self {
        self.entity_expand_size = entity_expand_size;
        self.component_expand_size = component_expand_size;
        self
    }

    /// Set the default log filter
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Check that every value is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entity_expand_size == 0 || self.component_expand_size == 0 {
            return Err(ConfigError::Invalid("expand sizes must be non-zero".to_string()));
        }
        if self.entity_capacity > MAX_HANDLES {
            return Err(ConfigError::Invalid(format!(
                "entity capacity {} exceeds the handle limit {}",
                self.entity_capacity, MAX_HANDLES
            )));
        }
        if self.component_capacity > MAX_COMPONENT_SLOTS {
            return Err(ConfigError::Invalid(format!(
                "component capacity {} exceeds the slot limit {}",
                self.component_capacity, MAX_COMPONENT_SLOTS
            )));
        }
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::Invalid("log level must not be empty".to_string()));
        }
        Ok(())
    }
}

impl Config for EcsConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("scene_engine_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(EcsConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_expand_size() {
        let config = EcsConfig::new().with_expand_sizes(0, 16);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_oversized_component_capacity() {
        let config = EcsConfig::new().with_component_capacity(MAX_COMPONENT_SLOTS + 1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let path = temp_path("ecs.toml");
        let config = EcsConfig::new()
            .with_entity_capacity(64)
            .with_component_capacity(32)
            .with_log_level("debug");

        config.save_to_file(&path).unwrap();
        let loaded = EcsConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_ron_partial_file_uses_defaults() {
        let path = temp_path("ecs.ron");
        std::fs::write(&path, "(entity_capacity: 8)").unwrap();
        let loaded = EcsConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.entity_capacity, 8);
        assert_eq!(loaded.component_capacity, EcsConfig::default().component_capacity);
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let result = EcsConfig::load_from_file("settings.yaml");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));

        let save = EcsConfig::default().save_to_file(temp_path("ecs.yaml"));
        assert!(matches!(save, Err(ConfigError::UnsupportedFormat(_))));
    }
}
