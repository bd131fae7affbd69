#![forbid(unsafe_code)]

//! Floating state dashboard for statelog.
//!
//! A renderer-agnostic model of the on-screen state monitor: it subscribes
//! to a [`statelog_core::Registry`], lists every tracked value newest first,
//! and owns its own visibility and draggable, persisted position. Hosts feed
//! it [`KeyEvent`]s and pointer coordinates and draw the lines returned by
//! [`Dashboard::render`].

pub mod dashboard;
pub mod keys;
pub mod position;
pub mod text;

pub use dashboard::{Dashboard, DashboardConfig, KeyOutcome};
pub use keys::{KeyCode, KeyEvent, Modifiers};
pub use position::{
    JsonFileStore, MemoryStore, POSITION_KEY, PanelPosition, PositionStore, StoreError,
};
