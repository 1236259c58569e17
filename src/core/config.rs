//! Configuration for hosts embedding the WIM interop layer
//!
//! Supports loading configuration from a TOML file.
//! Configuration is stored in a standard location:
//! - Windows: %APPDATA%\wimgapi\config.toml
//! - Linux/macOS: ~/.config/wimgapi/config.toml

use crate::core::options::{Compression, CreationDisposition, OpenOptions};
use crate::native::traits::{GENERIC_READ, GENERIC_WRITE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Application name used for config directory
const APP_NAME: &str = "wimgapi";

/// Default config file name
const CONFIG_FILE_NAME: &str = "config.toml";

/// Config file looked up in the working directory before the standard location
const LOCAL_CONFIG_FILE_NAME: &str = "wimgapi.toml";

/// Get the standard configuration directory for the application.
pub fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME))
}

/// Get the standard configuration file path.
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Native library location
    pub library: LibraryConfig,

    /// Defaults for opening containers
    pub open: OpenConfig,

    /// Scratch file placement
    pub temp: TempConfig,

    /// Progress reporting
    pub progress: ProgressConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Native library configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Explicit path to wimgapi.dll (system search path when unset)
    pub path: Option<PathBuf>,
}

/// Default open arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenConfig {
    /// Request write access in addition to read access
    pub write: bool,

    /// create-new, create-always, open-existing or open-always
    pub creation_disposition: CreationDisposition,

    /// Raw flags and attributes, passed through
    pub flags_and_attributes: u32,

    /// none, xpress, lzx or lzms
    pub compression: Compression,
}

/// Scratch directory configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempConfig {
    /// Directory for the native layer's temporary files
    pub directory: Option<PathBuf>,
}

/// Progress reporting configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Log per-file messages at info level instead of trace
    pub show_noisy: bool,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,
}

impl Default for OpenConfig {
    fn default() -> Self {
        Self {
            write: false,
            creation_disposition: CreationDisposition::OpenExisting,
            flags_and_attributes: 0,
            compression: Compression::None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl OpenConfig {
    /// The open arguments this section describes
    pub fn to_options(&self) -> OpenOptions {
        let access = if self.write {
            GENERIC_READ | GENERIC_WRITE
        } else {
            GENERIC_READ
        };

        OpenOptions::default()
            .access(access)
            .disposition(self.creation_disposition)
            .flags(self.flags_and_attributes)
            .compression(self.compression)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;

        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::ParseError(_, message) => {
                ConfigError::ParseError(path.to_path_buf(), message)
            }
            other => other,
        })
    }

    /// Parse configuration text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(PathBuf::new(), e.to_string()))
    }

    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./wimgapi.toml (current directory)
    /// 2. Standard config location
    ///
    /// If no config file is found, returns default configuration.
    pub fn load_default() -> Result<Self, ConfigError> {
        let local = PathBuf::from(".").join(LOCAL_CONFIG_FILE_NAME);
        if local.exists() {
            return Self::load(&local);
        }

        if let Some(config_path) = get_config_path() {
            if config_path.exists() {
                return Self::load(&config_path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(path.as_ref(), content)
            .map_err(|e| ConfigError::WriteError(path.as_ref().to_path_buf(), e.to_string()))?;

        Ok(())
    }

    /// Generate a default config file with comments
    pub fn generate_default_config() -> String {
        include_str!("../../config.example.toml").to_string()
    }
}

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file was not found at the specified path
    #[error("Configuration file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Failed to read the configuration file
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    ReadError(PathBuf, String),

    /// Failed to parse the configuration file (invalid TOML)
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    ParseError(PathBuf, String),

    /// Failed to serialize configuration to TOML
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(String),

    /// Failed to write configuration file
    #[error("Failed to write config file '{}': {}", .0.display(), .1)]
    WriteError(PathBuf, String),
}
