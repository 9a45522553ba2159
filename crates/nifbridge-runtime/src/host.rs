//! Process-wide host
//!
//! The `Host` stands in for the managed runtime a native library is loaded
//! into. It owns the resource-type registry, the loaded configuration and
//! the tokio runtime that managed-side processes run on.
//!
//! A library normally initializes one global host at load time with
//! [`Host::init`] and reaches it later through [`Host::get`]. Tests and
//! embedders that want isolation build private instances with
//! [`Host::new`].

use crate::call::CallContext;
use crate::error::{BridgeError, BridgeResult};
use crate::resource::{Destructor, ResourceRegistry, ResourceType, RtFlags};
use crate::tracing_setup::init_tracing_with_filter;
use nifbridge_config::{BridgeConfig, ConfigLoader};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

/// Global host, set once by `Host::init`
static HOST: OnceLock<Arc<Host>> = OnceLock::new();

pub struct Host {
    config: BridgeConfig,
    registry: ResourceRegistry,
    runtime: Runtime,
    /// Call-context resource type, opened on first `CallBridge::load`
    pub(crate) call_type: Mutex<Option<ResourceType<CallContext>>>,
}

impl Host {
    /// Build a private host from a validated configuration.
    ///
    /// Installs logging with the configured filter if nothing has been
    /// installed yet.
    pub fn new(config: BridgeConfig) -> BridgeResult<Self> {
        config.validate()?;
        init_tracing_with_filter(config.log_filter());

        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads())
            .thread_name(config.thread_name())
            .enable_all()
            .build()
            .map_err(|e| BridgeError::Runtime(e.to_string()))?;

        tracing::info!(
            worker_threads = config.worker_threads(),
            env_capacity = config.env_capacity(),
            "host started"
        );

        Ok(Self {
            config,
            registry: ResourceRegistry::new(),
            runtime,
            call_type: Mutex::new(None),
        })
    }

    /// Build a private host from `nifbridge.toml` found at or above `dir`
    pub fn from_directory(dir: &Path) -> BridgeResult<Self> {
        let loaded = ConfigLoader::new().load_from_directory(dir)?;
        if let Some(source) = &loaded.source {
            tracing::debug!(config = %source.display(), "configuration loaded");
        }
        Self::new(loaded.config)
    }

    /// Install the process-wide host. Fails if one already exists.
    pub fn init(config: BridgeConfig) -> BridgeResult<Arc<Host>> {
        if HOST.get().is_some() {
            return Err(BridgeError::AlreadyInitialized);
        }
        let host = Arc::new(Host::new(config)?);
        HOST.set(Arc::clone(&host))
            .map_err(|_| BridgeError::AlreadyInitialized)?;
        Ok(host)
    }

    /// The process-wide host
    pub fn get() -> BridgeResult<Arc<Host>> {
        HOST.get().cloned().ok_or(BridgeError::NotInitialized)
    }

    pub fn is_initialized() -> bool {
        HOST.get().is_some()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Open a resource type in this host's registry
    pub fn open_resource_type<T: Send + Sync + 'static>(
        &self,
        name: &str,
        flags: RtFlags,
        dtor: Option<Destructor<T>>,
    ) -> BridgeResult<ResourceType<T>> {
        self.registry.open(name, flags, dtor)
    }

    /// Run a managed-side process on the host runtime
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime.spawn(future)
    }

    pub fn handle(&self) -> &Handle {
        self.runtime.handle()
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nifbridge_config::RuntimeConfig;

    fn small_config() -> BridgeConfig {
        BridgeConfig {
            runtime: Some(RuntimeConfig {
                worker_threads: Some(1),
                thread_name: Some("host-test".to_string()),
            }),
            ..BridgeConfig::default()
        }
    }

    #[test]
    fn test_private_host_runs_tasks() {
        let host = Host::new(small_config()).unwrap();
        let answer = host.handle().block_on(host.spawn(async { 6 * 7 })).unwrap();
        assert_eq!(answer, 42);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = BridgeConfig {
            runtime: Some(RuntimeConfig {
                worker_threads: Some(0),
                thread_name: None,
            }),
            ..BridgeConfig::default()
        };
        assert!(matches!(Host::new(config), Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_resource_types_are_per_host() {
        let a = Host::new(small_config()).unwrap();
        let b = Host::new(small_config()).unwrap();

        a.open_resource_type::<u8>("x", RtFlags::CREATE, None).unwrap();
        assert!(a.registry().contains("x"));
        assert!(!b.registry().contains("x"));
    }

    #[test]
    fn test_global_init_once() {
        let first = Host::init(small_config()).unwrap();
        let second = Host::init(small_config());

        assert!(matches!(second, Err(BridgeError::AlreadyInitialized)));
        assert!(Arc::ptr_eq(&first, &Host::get().unwrap()));
    }
}
