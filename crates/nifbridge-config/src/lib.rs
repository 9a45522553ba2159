//! nifbridge Configuration System
//!
//! Provides configuration management for the nifbridge runtime:
//! - Bridge configuration (nifbridge.toml)
//! - Global user configuration (~/.nifbridge/config.toml)
//! - Environment variable overrides (NIFBRIDGE_*)
//! - Validation and merging
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Global config (~/.nifbridge/config.toml)
//! 3. Project config (./nifbridge.toml, found by walking up the directory tree)
//! 4. Environment variables (NIFBRIDGE_*)
//!
//! # Example
//!
//! ```no_run
//! use nifbridge_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let loaded = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("env capacity: {}", loaded.config.env_capacity());
//! ```

pub mod bridge;
pub mod loader;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use bridge::{BridgeConfig, CallConfig, LoggingConfig, RuntimeConfig};
pub use loader::{ConfigLoader, LoadedConfig, CONFIG_FILE_NAME};
