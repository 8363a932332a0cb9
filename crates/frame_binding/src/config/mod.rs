//! Configuration system
//!
//! Configuration files are TOML or RON, picked by file extension.

pub use serde::{Serialize, Deserialize};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(ConfigError::Io)?;

        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Load configuration from file, falling back to defaults when the file is missing
    fn load_or_default(path: &str) -> Result<Self, ConfigError> {
        if std::path::Path::new(path).exists() {
            Self::load_from_file(path)
        } else {
            log::info!("Config file {} not found, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
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

    /// A value is outside its allowed range
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Binding layer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    /// Number of frames the host may record ahead of the GPU
    pub frames_in_flight: usize,
    /// Device `minUniformBufferOffsetAlignment`
    pub min_uniform_offset_alignment: u64,
    /// Device `minStorageBufferOffsetAlignment`
    pub min_storage_offset_alignment: u64,
    /// Initial size in bytes of each slot's upload buffers
    pub initial_upload_capacity: u64,
    /// Log aggregated per-frame warnings
    pub warn_on_recoverable: bool,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            min_uniform_offset_alignment: 256,
            min_storage_offset_alignment: 256,
            initial_upload_capacity: 64 * 1024,
            warn_on_recoverable: true,
        }
    }
}

impl Config for BindingConfig {}

impl BindingConfig {
    /// Check ranges that the frame ring and arenas rely on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frames_in_flight == 0 {
            return Err(ConfigError::Invalid {
                field: "frames_in_flight",
                reason: "at least one frame slot is required".to_string(),
            });
        }
        for (field, alignment) in [
            ("min_uniform_offset_alignment", self.min_uniform_offset_alignment),
            ("min_storage_offset_alignment", self.min_storage_offset_alignment),
        ] {
            if !alignment.is_power_of_two() {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("{} is not a power of two", alignment),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BindingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frames_in_flight, 2);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: BindingConfig = toml::from_str("frames_in_flight = 3").unwrap();
        assert_eq!(config.frames_in_flight, 3);
        assert_eq!(config.min_storage_offset_alignment, 256);
    }

    #[test]
    fn test_ron_round_trip() {
        let config = BindingConfig {
            min_uniform_offset_alignment: 64,
            ..BindingConfig::default()
        };
        let text = ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::default()).unwrap();
        let parsed: BindingConfig = ron::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_rejects_bad_alignment() {
        let config = BindingConfig {
            min_storage_offset_alignment: 48,
            ..BindingConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "min_storage_offset_alignment", .. })
        ));
    }

    #[test]
    fn test_rejects_zero_frames() {
        let config = BindingConfig {
            frames_in_flight: 0,
            ..BindingConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unsupported_extension() {
        let result = BindingConfig::default().save_to_file("binding.json");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
