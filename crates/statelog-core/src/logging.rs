#![forbid(unsafe_code)]

//! Subscriber installation for binaries and tests.
//!
//! Library code only emits `tracing` events; installing a subscriber is the
//! host's call. These helpers read the filter from `STATELOG_LOG`.

#[cfg(feature = "tracing-subscriber")]
use tracing_subscriber::EnvFilter;

#[cfg(feature = "tracing-subscriber")]
use crate::config::StatelogConfig;

#[cfg(feature = "tracing-subscriber")]
fn filter(config: &StatelogConfig) -> EnvFilter {
    EnvFilter::try_new(&config.log_filter)
        .unwrap_or_else(|_| EnvFilter::new(crate::config::DEFAULT_LOG_FILTER))
}

/// Install a human-readable subscriber writing to stderr.
///
/// Returns `false` if a global subscriber was already set.
#[cfg(feature = "tracing-subscriber")]
pub fn init(config: &StatelogConfig) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter(config))
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

/// Install a JSON-lines subscriber writing to stderr.
///
/// Returns `false` if a global subscriber was already set.
#[cfg(feature = "tracing-json")]
pub fn init_json(config: &StatelogConfig) -> bool {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter(config))
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

#[cfg(all(test, feature = "tracing-subscriber"))]
mod tests {
    use super::*;

    #[test]
    fn bad_filter_falls_back() {
        let config = StatelogConfig {
            log_filter: "[[not a filter".into(),
            ..StatelogConfig::default()
        };
        let _ = filter(&config);
    }

    #[test]
    fn init_is_idempotent() {
        let config = StatelogConfig::default();
        let _ = init(&config);
        assert!(!init(&config));
    }
}
