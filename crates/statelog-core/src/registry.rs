#![forbid(unsafe_code)]

//! The state registry: latest observation per tracking key, with
//! synchronous change notification.
//!
//! # Design
//!
//! [`Registry`] is a cheap handle to shared, reference-counted storage
//! (`Rc<RefCell<..>>`). Clones see the same mapping and the same subscribers.
//! The mapping itself lives behind an `Rc` and is copied on write, so a
//! [`Snapshot`] is an O(1) immutable view that stays valid and unchanged no
//! matter what the registry does afterwards.
//!
//! # Invariants
//!
//! 1. At most one [`Observation`] per key: the latest. Nothing is merged.
//! 2. Every `record` and every `remove` produces exactly one notification per
//!    live subscriber, carrying the state right after that mutation.
//! 3. Subscribers are notified in registration order.
//! 4. Per-key timestamps never decrease, even if the clock steps backwards.
//! 5. A [`Subscription`] that was unsubscribed or dropped is never invoked
//!    again.
//!
//! # Re-entrancy
//!
//! A subscriber may call `record`/`remove` from inside its callback. The
//! mutation applies immediately; its notification is queued and delivered by
//! the outermost fan-out once the current one completes. Every subscriber
//! therefore sees snapshots in mutation order.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Missing key | `remove` on an absent key | No-op, still notifies |
//! | Odd payload | Adapter sends unexpected shapes | Stored verbatim |
//! | Leaked key | Adapter never tears down | One stale slot, other keys unaffected |
//! | Panicking subscriber | Callback panics | Panic propagates; queued snapshots are dropped, registry stays usable |

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::{Rc, Weak};

use serde_json::Value;
use tracing::{debug, trace};
use web_time::SystemTime;

use crate::callsite::Attribution;
use crate::clock::{Clock, SystemClock};
use crate::value::TypeTag;

type CallbackRc = Rc<dyn Fn(&Snapshot)>;
type CallbackWeak = Weak<dyn Fn(&Snapshot)>;

/// Payload sent by a tracking adapter for one observation.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationInput {
    pub value: Value,
    pub type_tag: TypeTag,
    pub attribution: Attribution,
    pub is_initial: bool,
}

impl ObservationInput {
    /// Build a payload, deriving the type tag from `value`.
    #[must_use]
    pub fn new(value: Value, attribution: Attribution, is_initial: bool) -> Self {
        Self {
            type_tag: TypeTag::of(&value),
            value,
            attribution,
            is_initial,
        }
    }
}

/// The latest recorded value and metadata for one tracking key.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub value: Value,
    pub type_tag: TypeTag,
    pub attribution: Attribution,
    /// True on first observation, and again whenever the value is
    /// structurally equal to the original initial value.
    pub is_initial: bool,
    /// Assigned by the registry.
    pub timestamp: SystemTime,
}

impl Observation {
    #[must_use]
    pub fn component(&self) -> &str {
        &self.attribution.component
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.attribution.location
    }
}

/// Immutable point-in-time copy of the key → observation mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    entries: Rc<BTreeMap<String, Observation>>,
}

impl Snapshot {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Observation> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Observation)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Entries newest first; equal timestamps fall back to key order.
    #[must_use]
    pub fn by_recency(&self) -> Vec<(&str, &Observation)> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by(|(ka, a), (kb, b)| b.timestamp.cmp(&a.timestamp).then_with(|| ka.cmp(kb)));
        entries
    }

    /// An owned, independently mutable copy of the mapping.
    #[must_use]
    pub fn into_map(self) -> BTreeMap<String, Observation> {
        Rc::unwrap_or_clone(self.entries)
    }
}

struct Subscriber {
    id: u64,
    callback: CallbackWeak,
}

/// Shared interior for [`Registry`].
struct RegistryInner {
    entries: Rc<BTreeMap<String, Observation>>,
    subscribers: Vec<Subscriber>,
    next_subscriber: u64,
    version: u64,
    clock: Box<dyn Clock>,
    /// Snapshots awaiting delivery while a fan-out is running, each with the
    /// first subscriber id that registered after its mutation.
    pending: VecDeque<(Snapshot, u64)>,
    notifying: bool,
}

impl RegistryInner {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            entries: Rc::clone(&self.entries),
        }
    }
}

/// Keyed store of the latest observation per tracked variable.
///
/// Construct one per isolated context with [`Registry::new`], or use the
/// thread's default instance from [`Registry::global`]. Pass it explicitly to
/// adapters and views.
///
/// # Example
///
/// ```
/// use statelog_core::{Attribution, ObservationInput, Registry};
/// use serde_json::json;
///
/// let registry = Registry::new();
/// let input = ObservationInput::new(json!(0), Attribution::new("Counter", "src/counter.rs"), true);
/// registry.record("counter", input);
/// assert_eq!(registry.snapshot().get("counter").map(|o| &o.value), Some(&json!(0)));
///
/// registry.remove("counter");
/// assert!(registry.snapshot().is_empty());
/// ```
#[derive(Clone)]
pub struct Registry {
    inner: Rc<RefCell<RegistryInner>>,
}

thread_local! {
    static GLOBAL: Registry = Registry::new();
}

impl Registry {
    /// Create an empty registry stamped by the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Create an empty registry with a custom time source.
    #[must_use]
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            inner: Rc::new(RefCell::new(RegistryInner {
                entries: Rc::new(BTreeMap::new()),
                subscribers: Vec::new(),
                next_subscriber: 0,
                version: 0,
                clock: Box::new(clock),
                pending: VecDeque::new(),
                notifying: false,
            })),
        }
    }

    /// The default registry for the current thread. Created on first use and
    /// kept for the thread's lifetime.
    #[must_use]
    pub fn global() -> Self {
        GLOBAL.with(Registry::clone)
    }

    /// Store `input` as the sole observation for `key`, then notify every
    /// subscriber before returning.
    pub fn record(&self, key: impl Into<String>, input: ObservationInput) {
        let key = key.into();
        let snapshot = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let now = inner.clock.now();
            let entries = Rc::make_mut(&mut inner.entries);
            let timestamp = match entries.get(&key) {
                Some(prev) if prev.timestamp > now => prev.timestamp,
                _ => now,
            };
            trace!(
                key = key.as_str(),
                type_tag = %input.type_tag,
                is_initial = input.is_initial,
                subscribers = inner.subscribers.len(),
                "state recorded"
            );
            entries.insert(
                key,
                Observation {
                    value: input.value,
                    type_tag: input.type_tag,
                    attribution: input.attribution,
                    is_initial: input.is_initial,
                    timestamp,
                },
            );
            inner.version += 1;
            inner.snapshot()
        };
        self.publish(snapshot);
    }

    /// Drop the observation for `key` if present, then notify.
    pub fn remove(&self, key: &str) {
        let snapshot = {
            let mut inner = self.inner.borrow_mut();
            let existed = inner.entries.contains_key(key);
            if existed {
                Rc::make_mut(&mut inner.entries).remove(key);
            }
            trace!(key, existed, subscribers = inner.subscribers.len(), "state removed");
            inner.version += 1;
            inner.snapshot()
        };
        self.publish(snapshot);
    }

    /// Current mapping. Later mutations never show through it.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.inner.borrow().snapshot()
    }

    /// Receive every snapshot produced by later mutations. Current state is
    /// not replayed; call [`Registry::snapshot`] right after subscribing.
    ///
    /// The callback stays registered until the returned [`Subscription`] is
    /// unsubscribed or dropped.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&Snapshot) + 'static) -> Subscription {
        let strong: CallbackRc = Rc::new(callback);
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_subscriber;
        inner.next_subscriber += 1;
        inner.subscribers.push(Subscriber {
            id,
            callback: Rc::downgrade(&strong),
        });
        debug!(id, subscribers = inner.subscribers.len(), "subscriber added");
        Subscription {
            id,
            registry: Rc::downgrade(&self.inner),
            callback: RefCell::new(Some(strong)),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().entries.is_empty()
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.borrow().entries.contains_key(key)
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .borrow()
            .subscribers
            .iter()
            .filter(|s| s.callback.strong_count() > 0)
            .count()
    }

    /// Mutation counter: +1 per `record` and per `remove`.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Queue `snapshot` and, unless a fan-out is already running further up
    /// the stack, deliver everything queued.
    fn publish(&self, snapshot: Snapshot) {
        {
            let mut inner = self.inner.borrow_mut();
            let watermark = inner.next_subscriber;
            inner.pending.push_back((snapshot, watermark));
            if inner.notifying {
                return;
            }
            inner.notifying = true;
        }
        let _guard = FanOutGuard {
            inner: &self.inner,
        };
        loop {
            // Collect callbacks first so no borrow is held during calls.
            let next = {
                let mut inner = self.inner.borrow_mut();
                inner.subscribers.retain(|s| s.callback.strong_count() > 0);
                inner.pending.pop_front().map(|(snap, watermark)| {
                    // Subscribers added after the mutation never see it.
                    let callbacks: Vec<CallbackWeak> = inner
                        .subscribers
                        .iter()
                        .filter(|s| s.id < watermark)
                        .map(|s| Weak::clone(&s.callback))
                        .collect();
                    (snap, callbacks)
                })
            };
            let Some((snapshot, callbacks)) = next else {
                break;
            };
            for weak in &callbacks {
                // Upgrade per call: an unsubscribe earlier in this round wins.
                if let Some(callback) = weak.upgrade() {
                    callback(&snapshot);
                }
            }
        }
    }

    fn unsubscribe(inner: &Weak<RefCell<RegistryInner>>, id: u64) {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let Ok(mut inner) = inner.try_borrow_mut() else {
            // Only reachable while the registry itself holds the borrow; the
            // dead weak entry is pruned on the next fan-out instead.
            return;
        };
        inner.subscribers.retain(|s| s.id != id);
        debug!(id, subscribers = inner.subscribers.len(), "subscriber removed");
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Registry")
            .field("entries", &inner.entries.len())
            .field("version", &inner.version)
            .field("subscriber_count", &inner.subscribers.len())
            .finish()
    }
}

/// Ends a fan-out, also when a subscriber panics.
struct FanOutGuard<'a> {
    inner: &'a Rc<RefCell<RegistryInner>>,
}

impl Drop for FanOutGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.try_borrow_mut() {
            inner.notifying = false;
            inner.pending.clear();
        }
    }
}

/// Handle for a registered subscriber callback.
///
/// [`Subscription::unsubscribe`] removes the callback; calling it again is a
/// no-op. Dropping the handle unsubscribes as well.
pub struct Subscription {
    id: u64,
    registry: Weak<RefCell<RegistryInner>>,
    /// Sole strong reference to the callback; the registry only holds a
    /// `Weak`, so releasing this makes the callback unreachable.
    callback: RefCell<Option<CallbackRc>>,
}

impl Subscription {
    /// Stop receiving snapshots. Idempotent.
    pub fn unsubscribe(&self) {
        if self.callback.borrow_mut().take().is_some() {
            Registry::unsubscribe(&self.registry, self.id);
        }
    }

    /// True until the first `unsubscribe`.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.callback.borrow().is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
