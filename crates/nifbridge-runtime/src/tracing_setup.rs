//! Tracing initialization.

use std::sync::OnceLock;

use nifbridge_config::bridge::DEFAULT_LOG_FILTER;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Directives of the first filter installed in this process
static INSTALLED: OnceLock<String> = OnceLock::new();

/// Initialize logging from the `NIFBRIDGE_LOG` environment variable.
///
/// Format: `NIFBRIDGE_LOG=nifbridge_runtime::call=debug,nifbridge_runtime=info`
///
/// Falls back to `nifbridge=info` if `NIFBRIDGE_LOG` is not set or is invalid.
pub fn init_tracing() {
    let directives =
        std::env::var("NIFBRIDGE_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());
    init_tracing_with_filter(&directives);
}

/// Initialize logging with an explicit filter, usually the configured
/// `[logging] filter`. `Host::new` calls this with its configuration.
///
/// Only the first call in a process installs anything. If the embedding
/// application already installed a global subscriber, that one is left in
/// place.
pub fn init_tracing_with_filter(directives: &str) {
    INSTALLED.get_or_init(|| match EnvFilter::try_new(directives) {
        Ok(filter) => {
            install(filter);
            directives.to_string()
        }
        Err(e) => {
            install(EnvFilter::new(DEFAULT_LOG_FILTER));
            tracing::warn!(filter = directives, error = %e, "invalid log filter, using default");
            DEFAULT_LOG_FILTER.to_string()
        }
    });
}

/// Filter directives in effect, `None` before the first initialization
pub fn installed_filter() -> Option<&'static str> {
    INSTALLED.get().map(String::as_str)
}

fn install(filter: EnvFilter) {
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .with(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing();
        let first = installed_filter();
        assert!(first.is_some());

        init_tracing();
        init_tracing_with_filter("nifbridge=debug");
        assert_eq!(installed_filter(), first);
        tracing::info!("still alive");
    }
}
