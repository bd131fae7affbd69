#![forbid(unsafe_code)]

//! Environment-driven configuration.
//!
//! | Variable | Values | Default |
//! |----------|--------|---------|
//! | `STATELOG_ATTRIBUTION` | `backtrace`, `caller`, `off` | `backtrace` |
//! | `STATELOG_KEY_POLICY` | `name`, `scoped` | `name` |
//! | `STATELOG_SKIP_FRAMES` | unsigned integer | `0` |
//! | `STATELOG_LOG` | tracing filter directive | `warn` |
//!
//! Unrecognised values fall back to the default and are reported with
//! `warn!`; configuration never fails.

use std::rc::Rc;

use tracing::warn;

use crate::callsite::{
    Attribution, BacktraceResolver, CallSiteResolver, CallerLocationResolver, DisabledResolver,
};

pub const ENV_ATTRIBUTION: &str = "STATELOG_ATTRIBUTION";
pub const ENV_KEY_POLICY: &str = "STATELOG_KEY_POLICY";
pub const ENV_SKIP_FRAMES: &str = "STATELOG_SKIP_FRAMES";
pub const ENV_LOG: &str = "STATELOG_LOG";

/// Default tracing filter when `STATELOG_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Which call-site resolver adapters use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttributionMode {
    #[default]
    Backtrace,
    Caller,
    Off,
}

impl AttributionMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "backtrace" | "stack" => Some(Self::Backtrace),
            "caller" | "location" => Some(Self::Caller),
            "off" | "none" | "0" | "false" => Some(Self::Off),
            _ => None,
        }
    }
}

/// How a tracked variable's registry key is formed.
///
/// `Name` keeps the human-chosen name as the key, so two live variables with
/// the same name share (and overwrite) one entry. `Scoped` prefixes the
/// attributed component, `Component::name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyPolicy {
    #[default]
    Name,
    Scoped,
}

impl KeyPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "name" => Some(Self::Name),
            "scoped" | "component" => Some(Self::Scoped),
            _ => None,
        }
    }

    /// Registry key for `name` declared under `attribution`.
    #[must_use]
    pub fn key_for(self, name: &str, attribution: &Attribution) -> String {
        match self {
            Self::Name => name.to_string(),
            Self::Scoped => format!("{}::{name}", attribution.component),
        }
    }
}

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatelogConfig {
    pub attribution: AttributionMode,
    pub key_policy: KeyPolicy,
    pub skip_frames: usize,
    pub log_filter: String,
}

impl Default for StatelogConfig {
    fn default() -> Self {
        Self {
            attribution: AttributionMode::default(),
            key_policy: KeyPolicy::default(),
            skip_frames: 0,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl StatelogConfig {
    /// Read the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Read configuration through a custom lookup.
    #[must_use]
    pub fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = get_env(ENV_ATTRIBUTION) {
            match AttributionMode::parse(&raw) {
                Some(mode) => config.attribution = mode,
                None => warn!(var = ENV_ATTRIBUTION, value = raw.as_str(), "unrecognised value, using default"),
            }
        }
        if let Some(raw) = get_env(ENV_KEY_POLICY) {
            match KeyPolicy::parse(&raw) {
                Some(policy) => config.key_policy = policy,
                None => warn!(var = ENV_KEY_POLICY, value = raw.as_str(), "unrecognised value, using default"),
            }
        }
        if let Some(raw) = get_env(ENV_SKIP_FRAMES) {
            match raw.trim().parse::<usize>() {
                Ok(n) => config.skip_frames = n,
                Err(_) => warn!(var = ENV_SKIP_FRAMES, value = raw.as_str(), "not a frame count, using default"),
            }
        }
        if let Some(raw) = get_env(ENV_LOG)
            && !raw.trim().is_empty()
        {
            config.log_filter = raw.trim().to_string();
        }
        config
    }

    /// The resolver this configuration selects.
    #[must_use]
    pub fn resolver(&self) -> Rc<dyn CallSiteResolver> {
        match self.attribution {
            AttributionMode::Backtrace => {
                Rc::new(BacktraceResolver::new().with_skip_frames(self.skip_frames))
            }
            AttributionMode::Caller => Rc::new(CallerLocationResolver),
            AttributionMode::Off => Rc::new(DisabledResolver),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callsite::CallSite;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(StatelogConfig::from_env_with(env(&[])), StatelogConfig::default());
    }

    #[test]
    fn parses_all_variables() {
        let config = StatelogConfig::from_env_with(env(&[
            (ENV_ATTRIBUTION, "Caller"),
            (ENV_KEY_POLICY, "scoped"),
            (ENV_SKIP_FRAMES, " 3 "),
            (ENV_LOG, "statelog_core=trace"),
        ]));
        assert_eq!(config.attribution, AttributionMode::Caller);
        assert_eq!(config.key_policy, KeyPolicy::Scoped);
        assert_eq!(config.skip_frames, 3);
        assert_eq!(config.log_filter, "statelog_core=trace");
    }

    #[test]
    fn bad_values_fall_back() {
        let config = StatelogConfig::from_env_with(env(&[
            (ENV_ATTRIBUTION, "psychic"),
            (ENV_KEY_POLICY, "random"),
            (ENV_SKIP_FRAMES, "-1"),
            (ENV_LOG, "   "),
        ]));
        assert_eq!(config, StatelogConfig::default());
    }

    #[test]
    fn off_resolver_is_unknown() {
        let config = StatelogConfig::from_env_with(env(&[(ENV_ATTRIBUTION, "off")]));
        assert!(config.resolver().resolve(&CallSite::here()).is_unknown());
    }

    #[test]
    fn scoped_key_prefixes_component() {
        let attribution = Attribution::new("Cart", "src/cart.rs");
        assert_eq!(KeyPolicy::Scoped.key_for("total", &attribution), "Cart::total");
        assert_eq!(KeyPolicy::Name.key_for("total", &attribution), "total");
    }
}
