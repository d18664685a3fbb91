//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Route harness logs to the test output, filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Log to stderr without targets, filtered by `RUST_LOG` (default `warn`).
///
/// The caller reports assertion outcomes itself, so the assertion events
/// are silenced unless `RUST_LOG` asks for them.
pub fn init_cli_logging(verbose: bool) {
    let directives = cli_directives(verbose, std::env::var("RUST_LOG").ok());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directives))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn cli_directives(verbose: bool, rust_log: Option<String>) -> String {
    match (verbose, rust_log) {
        (false, Some(directives)) if !directives.trim().is_empty() => directives,
        (true, _) => "icmd_harness=debug,icmd=debug,icmd_harness::assertions=off".into(),
        (false, _) => "warn,icmd_harness::assertions=off".into(),
    }
}
