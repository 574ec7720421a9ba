//! Tracing subscriber setup
//!
//! The library only emits `tracing` events. Programs that do not install a
//! subscriber of their own can call [`init`] to get stderr output filtered
//! by `BC_LOGLEVEL`.

use crate::settings::Settings;
use tracing_subscriber::EnvFilter;

/// Build the filter for `settings`, falling back to `info` for a directive
/// that does not parse.
pub fn env_filter(settings: &Settings) -> EnvFilter {
    EnvFilter::try_new(&settings.log_filter).unwrap_or_else(|e| {
        eprintln!(
            "breakchoice: ignoring invalid log filter {:?}: {e}",
            settings.log_filter
        );
        EnvFilter::new("info")
    })
}

/// Install a stderr subscriber. Returns `false` if one was already set.
pub fn init(settings: &Settings) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(settings))
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
