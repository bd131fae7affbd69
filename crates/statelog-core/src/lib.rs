#![forbid(unsafe_code)]

//! Core: state registry, call-site attribution, and tracking lifecycle.
//!
//! # Role in statelog
//! `statelog-core` instruments value-holding variables in a component tree.
//! Every creation and mutation of a tracked value is stamped, attributed to
//! the component that declared it, and published to subscribers such as the
//! dashboard view (`statelog-dashboard`).
//!
//! # Primary responsibilities
//! - **Registry**: latest [`Observation`] per tracking key, copy-on-write
//!   [`Snapshot`]s, synchronous fan-out to subscribers.
//! - **Call-site attribution**: best-effort `(component, location)` labels
//!   from the live stack ([`callsite`]).
//! - **Tracking lifecycle**: [`StateTracker`] (`on_create` / `on_change` /
//!   `on_destroy`) and the owned [`Tracked<T>`] pair built on it.
//!
//! # Data flow
//! adapter → call-site resolver → [`Registry::record`] → snapshot fan-out →
//! view re-renders.
//!
//! Everything is single-threaded: a registry handle is `!Send`, and
//! [`Registry::global`] is the default instance of the calling UI thread.

pub mod callsite;
pub mod clock;
pub mod config;
pub mod logging;
pub mod registry;
pub mod tracker;
pub mod value;

pub use callsite::{Attribution, CallSite, CallSiteResolver};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AttributionMode, KeyPolicy, StatelogConfig};
pub use registry::{Observation, ObservationInput, Registry, Snapshot, Subscription};
pub use tracker::{StateTracker, TrackOptions, Tracked};
pub use value::TypeTag;

// Timestamps use `web_time::SystemTime` (std's type on native targets).
pub use web_time::SystemTime;
