//! Configuration system
//!
//! Engine settings are plain serde structs. Files are TOML or RON, picked by
//! extension, and every load is validated before the value is handed out, so
//! a bad batch count or alignment never reaches the culler or the storages.

mod engine;

use std::path::{Path, PathBuf};

pub use engine::{
    ChildPolicy, CullingConfig, EngineConfig, SceneConfig, StorageConfig,
};
pub use serde::{Serialize, Deserialize};

/// On-disk formats understood by [`Config`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `.toml`
    Toml,
    /// `.ron`
    Ron,
}

impl ConfigFormat {
    /// Format named by the file extension (case-insensitive)
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let extension = path
            .extension()
            .and_then(|extension| extension.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("toml") => Ok(Self::Toml),
            Some("ron") => Ok(Self::Ron),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// Serde-backed settings that can be read from and written to disk
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Reject values outside their accepted range
    fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Parse and validate `text` in `format`
    fn from_str_as(text: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        let config: Self = match format {
            ConfigFormat::Toml => toml::from_str(text).map_err(|e| ConfigError::Parse {
                format,
                message: e.to_string(),
            })?,
            ConfigFormat::Ron => ron::from_str(text).map_err(|e| ConfigError::Parse {
                format,
                message: e.to_string(),
            })?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Render in `format`
    fn to_string_as(&self, format: ConfigFormat) -> Result<String, ConfigError> {
        match format {
            ConfigFormat::Toml => {
                toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
            }
            ConfigFormat::Ron => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string())),
        }
    }

    /// Load, parse and validate a config file
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_str_as(&text, format)?;
        log::debug!("Loaded {:?} configuration from {}", format, path.display());
        Ok(config)
    }

    /// Write the config to `path` in the format its extension names
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let text = self.to_string_as(ConfigFormat::from_path(path)?)?;
        std::fs::write(path, text).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// Reading or writing the file failed
    #[error("cannot access {}: {source}", path.display())]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Text is not valid for the format
    #[error("invalid {format:?} configuration: {message}")]
    Parse {
        /// Format the text was parsed as
        format: ConfigFormat,
        /// Parser message
        message: String,
    },

    /// Value could not be rendered
    #[error("cannot serialize configuration: {0}")]
    Serialize(String),

    /// Extension is neither `.toml` nor `.ron`
    #[error("unsupported configuration format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// A value is out of its accepted range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
