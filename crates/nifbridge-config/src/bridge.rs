//! Bridge configuration (nifbridge.toml)
//!
//! Every field is optional on disk; accessors fall back to the built-in
//! defaults so an empty file is a valid configuration.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default heap-word budget for one call context's isolated environment
pub const DEFAULT_ENV_CAPACITY: usize = 1 << 20;

/// Default number of term slots reserved when an environment is created
pub const DEFAULT_INITIAL_RESERVE: usize = 8;

/// Default number of host runtime worker threads
pub const DEFAULT_WORKER_THREADS: usize = 2;

/// Default name prefix for host runtime threads
pub const DEFAULT_THREAD_NAME: &str = "nifbridge-host";

/// Default tracing filter directive
pub const DEFAULT_LOG_FILTER: &str = "nifbridge=info";

const MAX_WORKER_THREADS: usize = 1024;

/// Top-level bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Call bridge settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call: Option<CallConfig>,

    /// Host runtime settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<RuntimeConfig>,

    /// Logging settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Call bridge settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct CallConfig {
    /// Maximum heap words a context's isolated environment may hold.
    /// Every term node costs one word; binaries and strings add their
    /// payload in 8-byte words.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_capacity: Option<usize>,

    /// Term slots reserved up front when a context is prepared
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_reserve: Option<usize>,
}

/// Host runtime settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Worker threads running managed-side processes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_threads: Option<usize>,

    /// Thread name prefix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_name: Option<String>,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `nifbridge=debug`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl BridgeConfig {
    /// Parse a configuration from a TOML string and validate it
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        Self::parse(content, Path::new("<inline>"))
    }

    /// Load a configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        Self::parse(&content, path)
    }

    fn parse(content: &str, origin: &Path) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::TomlParseError {
            file: origin.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate field ranges and cross-field constraints
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(call) = &self.call {
            if call.env_capacity == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: "call.env_capacity".to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if self.initial_reserve() > self.env_capacity() {
            return Err(ConfigError::InvalidValue {
                field: "call.initial_reserve".to_string(),
                reason: format!(
                    "{} exceeds call.env_capacity ({})",
                    self.initial_reserve(),
                    self.env_capacity()
                ),
            });
        }

        if let Some(runtime) = &self.runtime {
            if let Some(threads) = runtime.worker_threads {
                if threads == 0 || threads > MAX_WORKER_THREADS {
                    return Err(ConfigError::InvalidValue {
                        field: "runtime.worker_threads".to_string(),
                        reason: format!(
                            "must be between 1 and {}, got {}",
                            MAX_WORKER_THREADS, threads
                        ),
                    });
                }
            }
            if let Some(name) = &runtime.thread_name {
                if name.trim().is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: "runtime.thread_name".to_string(),
                        reason: "must not be empty".to_string(),
                    });
                }
            }
        }

        if let Some(filter) = self.logging.as_ref().and_then(|l| l.filter.as_deref()) {
            if filter.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "logging.filter".to_string(),
                    reason: "must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Merge another configuration into this one.
    /// Other config takes precedence for every field it sets.
    pub fn merge(&mut self, other: &BridgeConfig) {
        if let Some(call) = &other.call {
            let mine = self.call.get_or_insert_with(CallConfig::default);
            if call.env_capacity.is_some() {
                mine.env_capacity = call.env_capacity;
            }
            if call.initial_reserve.is_some() {
                mine.initial_reserve = call.initial_reserve;
            }
        }
        if let Some(runtime) = &other.runtime {
            let mine = self.runtime.get_or_insert_with(RuntimeConfig::default);
            if runtime.worker_threads.is_some() {
                mine.worker_threads = runtime.worker_threads;
            }
            if runtime.thread_name.is_some() {
                mine.thread_name = runtime.thread_name.clone();
            }
        }
        if let Some(logging) = &other.logging {
            if logging.filter.is_some() {
                self.logging = Some(logging.clone());
            }
        }
    }

    /// Effective environment word budget
    pub fn env_capacity(&self) -> usize {
        self.call
            .as_ref()
            .and_then(|c| c.env_capacity)
            .unwrap_or(DEFAULT_ENV_CAPACITY)
    }

    /// Effective number of slots reserved per environment
    pub fn initial_reserve(&self) -> usize {
        self.call
            .as_ref()
            .and_then(|c| c.initial_reserve)
            .unwrap_or(DEFAULT_INITIAL_RESERVE)
    }

    /// Effective worker thread count
    pub fn worker_threads(&self) -> usize {
        self.runtime
            .as_ref()
            .and_then(|r| r.worker_threads)
            .unwrap_or(DEFAULT_WORKER_THREADS)
    }

    /// Effective thread name prefix
    pub fn thread_name(&self) -> &str {
        self.runtime
            .as_ref()
            .and_then(|r| r.thread_name.as_deref())
            .unwrap_or(DEFAULT_THREAD_NAME)
    }

    /// Effective tracing filter
    pub fn log_filter(&self) -> &str {
        self.logging
            .as_ref()
            .and_then(|l| l.filter.as_deref())
            .unwrap_or(DEFAULT_LOG_FILTER)
    }
}
