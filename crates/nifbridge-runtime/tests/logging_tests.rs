//! Logging is installed from the host configuration.
//!
//! Kept in its own test binary: the subscriber is process-wide and only the
//! first filter installed takes effect.

use nifbridge_config::{BridgeConfig, LoggingConfig};
use nifbridge_runtime::{installed_filter, Host};

#[test]
fn test_host_installs_configured_filter() {
    assert_eq!(installed_filter(), None);

    let config = BridgeConfig {
        logging: Some(LoggingConfig {
            filter: Some("nifbridge_runtime=debug".to_string()),
        }),
        ..BridgeConfig::default()
    };
    let _host = Host::new(config).unwrap();

    assert_eq!(installed_filter(), Some("nifbridge_runtime=debug"));
}
