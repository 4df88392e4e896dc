//! Structured logging for the disclosure engine and its hosts.
//!
//! Console output with uptime timestamps and targets, plus JSON file logging
//! in debug builds. The filter comes from the config's `log_level` and can be
//! overridden with `RUST_LOG`.

use std::path::Path;

use shroud_config::Config;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when no config is given.
pub const DEFAULT_FILTER: &str = "info";

/// Target that carries per-object hide, reveal, and defer events.
pub const LOAD_EVENTS_TARGET: &str = "shroud_disclosure";

/// Builds the filter string for `config`.
///
/// `log_load_events` raises the engine target to `debug` on top of the
/// configured level.
pub fn filter_string(config: Option<&Config>) -> String {
    let Some(config) = config else {
        return DEFAULT_FILTER.to_string();
    };
    let base = if config.debug.log_level.is_empty() {
        DEFAULT_FILTER
    } else {
        config.debug.log_level.as_str()
    };
    if config.debug.log_load_events {
        format!("{base},{LOAD_EVENTS_TARGET}=debug")
    } else {
        base.to_string()
    }
}

/// Initialize the tracing subscriber.
///
/// * `log_dir` - Directory for the JSON log file (debug builds only)
/// * `debug_build` - Whether to add the JSON file layer
/// * `config` - Configuration supplying the log level
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) {
    let filter_str = filter_string(config);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true) // scan workers are named
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if debug_build
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = std::fs::File::create(log_dir.join("shroud.log"))
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        subscriber.with(file_layer).init();
        return;
    }

    subscriber.init();
}

/// An `EnvFilter` with the default filter string.
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}
