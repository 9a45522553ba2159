//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::bridge::{BridgeConfig, CallConfig, LoggingConfig, RuntimeConfig};
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// File name searched for when walking up from a start directory
pub const CONFIG_FILE_NAME: &str = "nifbridge.toml";

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.nifbridge/config.toml) - lowest priority
/// 2. Project config (./nifbridge.toml) - overrides global
/// 3. Environment variables (NIFBRIDGE_*) - overrides project
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Effective configuration
    pub config: BridgeConfig,

    /// Project config file that contributed, if one was found
    pub source: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Create a loader that reads the global layer from an explicit path
    pub fn with_global_path(path: impl Into<PathBuf>) -> Self {
        Self {
            global_config_path: Some(path.into()),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find nifbridge.toml, layers it over the
    /// global config and applies environment overrides.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<LoadedConfig> {
        let (source, project) = self.find_project_config(start_dir)?;
        self.finish(source, project)
    }

    /// Load configuration from a specific config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<LoadedConfig> {
        let project = BridgeConfig::load_from_file(config_path)?;
        self.finish(Some(config_path.to_path_buf()), project)
    }

    fn finish(
        &mut self,
        source: Option<PathBuf>,
        project: BridgeConfig,
    ) -> ConfigResult<LoadedConfig> {
        let mut config = self.load_global_config()?;
        config.merge(&project);
        let config = self.apply_env_overrides(config)?;
        config.validate()?;

        Ok(LoadedConfig { config, source })
    }

    /// Find project configuration by walking up directory tree
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, BridgeConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.exists() {
                let config = BridgeConfig::load_from_file(&config_path)?;
                return Ok((Some(config_path), config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, BridgeConfig::default())),
            }
        }
    }

    /// Load global configuration from ~/.nifbridge/config.toml
    fn load_global_config(&mut self) -> ConfigResult<BridgeConfig> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => match Self::global_config_dir() {
                Ok(dir) => {
                    let path = dir.join("config.toml");
                    self.global_config_path = Some(path.clone());
                    path
                }
                // No home directory means no global layer
                Err(ConfigError::HomeNotFound) => return Ok(BridgeConfig::default()),
                Err(e) => return Err(e),
            },
        };

        if !path.exists() {
            return Ok(BridgeConfig::default());
        }

        BridgeConfig::load_from_file(&path)
    }

    /// Apply environment variable overrides
    ///
    /// Recognised variables: NIFBRIDGE_ENV_CAPACITY, NIFBRIDGE_WORKER_THREADS,
    /// NIFBRIDGE_LOG.
    fn apply_env_overrides(&self, mut config: BridgeConfig) -> ConfigResult<BridgeConfig> {
        if let Ok(capacity) = env::var("NIFBRIDGE_ENV_CAPACITY") {
            let capacity = parse_usize("NIFBRIDGE_ENV_CAPACITY", &capacity)?;
            config
                .call
                .get_or_insert_with(CallConfig::default)
                .env_capacity = Some(capacity);
        }

        if let Ok(threads) = env::var("NIFBRIDGE_WORKER_THREADS") {
            let threads = parse_usize("NIFBRIDGE_WORKER_THREADS", &threads)?;
            config
                .runtime
                .get_or_insert_with(RuntimeConfig::default)
                .worker_threads = Some(threads);
        }

        if let Ok(filter) = env::var("NIFBRIDGE_LOG") {
            config.logging = Some(LoggingConfig {
                filter: Some(filter),
            });
        }

        Ok(config)
    }

    /// Get the global configuration directory (~/.nifbridge)
    pub fn global_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".nifbridge"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_usize(field: &str, raw: &str) -> ConfigResult<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|e| ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("expected an unsigned integer, got '{}' ({})", raw, e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_usize_rejects_garbage() {
        let err = parse_usize("NIFBRIDGE_ENV_CAPACITY", "lots").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_parse_usize_trims() {
        assert_eq!(parse_usize("X", " 42 ").unwrap(), 42);
    }
}
