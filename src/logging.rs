//! The diagnostic sink.
//!
//! Library code only emits `tracing` events. Binaries call [`init`] once at
//! start-up to install a stderr subscriber filtered by [`LogConfig`].

use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Filter used when the configured directive does not parse.
pub const FALLBACK_FILTER: &str = "info";

/// Builds the env filter for `config`, falling back to [`FALLBACK_FILTER`].
///
/// The second element carries the parse error when the fallback was used.
#[must_use]
pub fn filter_for(config: &LogConfig) -> (EnvFilter, Option<String>) {
    match EnvFilter::try_new(&config.filter) {
        Ok(filter) => (filter, None),
        Err(err) => (
            EnvFilter::new(FALLBACK_FILTER),
            Some(format!("invalid log filter '{}': {err}", config.filter)),
        ),
    }
}

/// Installs the global subscriber. Returns false if one was already installed.
pub fn init(config: &LogConfig) -> bool {
    let (filter, problem) = filter_for(config);
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok();

    if let Some(problem) = problem {
        tracing::warn!(fallback = FALLBACK_FILTER, "{problem}");
    }
    installed
}
