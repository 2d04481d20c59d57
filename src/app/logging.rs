//! Logging configuration and initialization

use crate::app::config::AppConfig;
use tracing::{debug, trace};
use tracing_subscriber::EnvFilter;

/// Filter used for this run; `RUST_LOG` wins over the configured level
pub fn build_filter(config: &AppConfig, configured_level: &str) -> EnvFilter {
    let level = config.log_level(configured_level);
    if config.verbose == 0 {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return filter;
        }
    }
    EnvFilter::new(level)
}

/// Initialize tracing/logging for the application
///
/// Logs go to stderr so command output on stdout stays machine readable.
pub fn init_logging(config: &AppConfig, configured_level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(build_filter(config, configured_level))
        .with_writer(std::io::stderr)
        .with_target(config.verbose >= 2) // Show target module for -vv and above
        .with_thread_ids(config.verbose >= 3)
        .with_line_number(config.verbose >= 3);

    if subscriber.try_init().is_err() {
        debug!("Logging was already initialized");
        return;
    }

    debug!("dockhand started with verbosity level: {}", config.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());
}
