//! Shared helpers for integration tests.
//!
//! Each integration test file compiles common/ as its own module, so not
//! every helper is used in every file.
#![allow(dead_code)]

use std::time::Duration;

use icmd_harness::mocks::{MockIcommands, MockIcommandsBuilder};
use icmd_harness::{ConfigLoader, HarnessConfig, Session};

/// Config for a live grid: the layered files plus `ICMD_*` overrides.
pub fn live_config() -> HarnessConfig {
    icmd_harness::logging::init_test_logging();
    ConfigLoader::new()
        .load()
        .expect("should load harness config")
        .config
}

/// Config that routes every icommand to the stubs in `mock`.
pub fn mock_config(mock: &MockIcommands) -> HarnessConfig {
    icmd_harness::logging::init_test_logging();
    HarnessConfig {
        bin_dir: Some(mock.bin_dir().to_path_buf()),
        grace_period_ms: 200,
        ..HarnessConfig::default()
    }
}

/// Stubs for every icommand, all succeeding silently.
pub fn quiet_mock() -> MockIcommands {
    MockIcommandsBuilder::new()
        .build()
        .expect("should write icommand stubs")
}

/// A session for the admin user of `config`.
pub fn admin_session(config: &HarnessConfig) -> Session {
    Session::from_config(config, &config.admin_user).expect("should create admin session")
}

/// Upper bound on how long an interrupted command may keep a test waiting.
pub fn interrupt_bound(timeout: Duration, config: &HarnessConfig) -> Duration {
    timeout + config.grace_period() + Duration::from_secs(1)
}
