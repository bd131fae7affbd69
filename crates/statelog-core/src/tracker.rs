#![forbid(unsafe_code)]

//! Tracking adapters: wire one variable's lifecycle into a [`Registry`].
//!
//! [`StateTracker`] is the framework-neutral contract any component model
//! drives: `on_create` when the variable is first declared, `on_change` when
//! its value changes, `on_destroy` when its owner is torn down.
//! [`Tracked<T>`] packages that contract as an owned `(value, setter)` pair
//! whose teardown is tied to `Drop`.
//!
//! # Invariants
//!
//! 1. `on_create` records exactly once with `is_initial = true`.
//! 2. `on_change` records `is_initial = structurally_equal(new, initial)`.
//! 3. `on_destroy` removes the key exactly once; later calls are ignored, and
//!    so is any `on_change` after it.

use std::rc::Rc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::callsite::{Attribution, BacktraceResolver, CallSite, CallSiteResolver};
use crate::config::{KeyPolicy, StatelogConfig};
use crate::registry::{ObservationInput, Registry};
use crate::value::{capture, structurally_equal};

/// How adapters attribute and key tracked variables.
#[derive(Clone)]
pub struct TrackOptions {
    resolver: Rc<dyn CallSiteResolver>,
    key_policy: KeyPolicy,
}

impl TrackOptions {
    /// Backtrace attribution, keys are the human-chosen names.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resolver: Rc::new(BacktraceResolver::new()),
            key_policy: KeyPolicy::Name,
        }
    }

    /// Options described by an environment-derived config.
    #[must_use]
    pub fn from_config(config: &StatelogConfig) -> Self {
        Self {
            resolver: config.resolver(),
            key_policy: config.key_policy,
        }
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: impl CallSiteResolver + 'static) -> Self {
        self.resolver = Rc::new(resolver);
        self
    }

    #[must_use]
    pub fn with_key_policy(mut self, policy: KeyPolicy) -> Self {
        self.key_policy = policy;
        self
    }

    #[must_use]
    pub fn key_policy(&self) -> KeyPolicy {
        self.key_policy
    }

    /// Resolve attribution for `site`.
    #[must_use]
    pub fn resolve(&self, site: &CallSite) -> Attribution {
        self.resolver.resolve(site)
    }
}

impl Default for TrackOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TrackOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackOptions")
            .field("key_policy", &self.key_policy)
            .finish_non_exhaustive()
    }
}

/// Lifecycle glue for one tracked variable.
#[derive(Debug)]
pub struct StateTracker {
    registry: Registry,
    key: String,
    attribution: Attribution,
    initial: Value,
    current: Value,
    destroyed: bool,
}

impl StateTracker {
    /// First observation: records `initial` with `is_initial = true`.
    ///
    /// An existing entry under `key` is overwritten; the collision is logged.
    pub fn on_create(
        registry: &Registry,
        key: impl Into<String>,
        attribution: Attribution,
        initial: Value,
    ) -> Self {
        let key = key.into();
        if registry.contains_key(&key) {
            warn!(
                key = key.as_str(),
                component = attribution.component.as_str(),
                "tracking key collision, newer variable takes over the key"
            );
        }
        registry.record(
            key.clone(),
            ObservationInput::new(initial.clone(), attribution.clone(), true),
        );
        Self {
            registry: registry.clone(),
            key,
            attribution,
            current: initial.clone(),
            initial,
            destroyed: false,
        }
    }

    /// Record a new value. Returns `false` (and records nothing) when the
    /// value is unchanged or the tracker was destroyed.
    pub fn on_change(&mut self, value: Value) -> bool {
        if self.destroyed || value == self.current {
            return false;
        }
        let is_initial = structurally_equal(&value, &self.initial);
        self.registry.record(
            self.key.clone(),
            ObservationInput::new(value.clone(), self.attribution.clone(), is_initial),
        );
        self.current = value;
        true
    }

    /// Remove the key from the registry. Idempotent.
    pub fn on_destroy(&mut self) {
        if self.destroyed {
            return;
        }
        if self.is_superseded() {
            debug!(
                key = self.key.as_str(),
                component = self.attribution.component.as_str(),
                "teardown removes a key another variable took over"
            );
        }
        self.destroyed = true;
        self.registry.remove(&self.key);
    }

    /// True while another tracker's observation occupies this key (a
    /// `KeyPolicy::Name` collision). Teardown still removes the key.
    #[must_use]
    pub fn is_superseded(&self) -> bool {
        if self.destroyed {
            return false;
        }
        self.registry
            .snapshot()
            .get(&self.key)
            .is_some_and(|obs| obs.attribution != self.attribution || obs.value != self.current)
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn attribution(&self) -> &Attribution {
        &self.attribution
    }

    #[must_use]
    pub fn initial(&self) -> &Value {
        &self.initial
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl Drop for StateTracker {
    fn drop(&mut self) {
        self.on_destroy();
    }
}

/// A tracked variable: read with [`Tracked::get`], write with
/// [`Tracked::set`]. Dropping it removes its entry from the registry.
///
/// # Example
///
/// ```
/// use statelog_core::{Registry, TrackOptions, Tracked};
/// use statelog_core::callsite::CallerLocationResolver;
///
/// let registry = Registry::new();
/// let options = TrackOptions::new().with_resolver(CallerLocationResolver);
/// let mut count = Tracked::with_options(&registry, "count", 0, &options);
/// count.set(1);
/// assert_eq!(registry.snapshot().get("count").map(|o| o.is_initial), Some(false));
/// count.set(0);
/// assert_eq!(registry.snapshot().get("count").map(|o| o.is_initial), Some(true));
/// drop(count);
/// assert!(registry.is_empty());
/// ```
#[derive(Debug)]
pub struct Tracked<T> {
    value: T,
    tracker: StateTracker,
}

impl<T: Serialize> Tracked<T> {
    /// Declare a tracked variable with default options. Attribution is
    /// resolved here, on the declaring call path.
    #[track_caller]
    pub fn new(registry: &Registry, name: &str, initial: T) -> Self {
        Self::with_options(registry, name, initial, &TrackOptions::default())
    }

    /// Declare a tracked variable with explicit options.
    #[track_caller]
    pub fn with_options(registry: &Registry, name: &str, initial: T, options: &TrackOptions) -> Self {
        let site = CallSite::here();
        let attribution = options.resolve(&site);
        let key = options.key_policy().key_for(name, &attribution);
        let tracker = StateTracker::on_create(registry, key, attribution, capture(&initial));
        Self {
            value: initial,
            tracker,
        }
    }

    #[must_use]
    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn set(&mut self, value: T) {
        self.value = value;
        self.tracker.on_change(capture(&self.value));
    }

    /// Replace the value, returning the previous one.
    pub fn replace(&mut self, value: T) -> T {
        let old = std::mem::replace(&mut self.value, value);
        self.tracker.on_change(capture(&self.value));
        old
    }

    /// Mutate in place; records only if the captured value changed.
    pub fn update(&mut self, f: impl FnOnce(&mut T)) {
        f(&mut self.value);
        self.tracker.on_change(capture(&self.value));
    }

    #[must_use]
    pub fn key(&self) -> &str {
        self.tracker.key()
    }

    #[must_use]
    pub fn attribution(&self) -> &Attribution {
        self.tracker.attribution()
    }

    /// Tear down and keep the plain value.
    #[must_use]
    pub fn into_inner(self) -> T {
        let Self { value, tracker } = self;
        drop(tracker);
        value
    }
}
