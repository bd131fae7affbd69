#![forbid(unsafe_code)]

//! Floating state dashboard: a view over a [`Registry`].
//!
//! The dashboard subscribes on [`Dashboard::mount`], keeps the latest
//! [`Snapshot`], and renders it as text lines on demand. It also owns the
//! incidental UI state: visibility (Ctrl+Shift+S toggles, Escape hides) and
//! a draggable, persisted screen position. None of it feeds back into the
//! registry.
//!
//! # Example
//!
//! ```
//! use statelog_core::{Attribution, ObservationInput, Registry};
//! use statelog_dashboard::{Dashboard, DashboardConfig, MemoryStore};
//! use serde_json::json;
//!
//! let registry = Registry::new();
//! let mut dashboard = Dashboard::new(registry.clone(), MemoryStore::new(), DashboardConfig::default());
//! dashboard.mount();
//!
//! registry.record("count", ObservationInput::new(json!(1), Attribution::unknown(), true));
//! assert_eq!(dashboard.entry_count(), 1);
//! assert!(dashboard.render(60)[0].starts_with("State Monitor (1 states)"));
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use statelog_core::clock::format_time_of_day;
use statelog_core::value::render_value;
use statelog_core::{Observation, Registry, Snapshot, Subscription};
use tracing::{debug, warn};

use crate::keys::{KeyCode, KeyEvent, Modifiers};
use crate::position::{PanelPosition, PositionStore, load_position, save_position};
use crate::text::truncate_to_width;

const UNKNOWN: &str = "Unknown";

/// Dashboard settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardConfig {
    /// Heading text; the entry count is appended.
    pub title: String,
    /// Version shown in the footer.
    pub version: String,
    /// Prefixes removed from locations before display.
    pub strip_location_prefixes: Vec<String>,
    /// Visible right after construction.
    pub start_visible: bool,
    /// Used when nothing was persisted.
    pub default_position: PanelPosition,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            title: "State Monitor".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            strip_location_prefixes: Vec::new(),
            start_visible: true,
            default_position: PanelPosition::default(),
        }
    }
}

impl DashboardConfig {
    /// Show the host application's version instead of this crate's.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn strip_location_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.strip_location_prefixes.push(prefix.into());
        self
    }

    #[must_use]
    pub fn with_start_visible(mut self, visible: bool) -> Self {
        self.start_visible = visible;
        self
    }

    #[must_use]
    pub fn with_default_position(mut self, position: PanelPosition) -> Self {
        self.default_position = position;
        self
    }
}

/// Result of feeding a key to the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Visibility flipped; carries the new state.
    Toggled(bool),
    /// Escape hid the panel.
    Hidden,
    /// Not a dashboard key.
    Ignored,
}

/// State shared with the subscriber callback.
#[derive(Debug, Default)]
struct ViewState {
    snapshot: Snapshot,
    dirty: bool,
    generation: u64,
}

#[derive(Debug, Clone, Copy)]
struct DragState {
    origin: PanelPosition,
    grab_dx: i32,
    grab_dy: i32,
}

/// Renderer-agnostic dashboard model.
pub struct Dashboard {
    registry: Registry,
    store: Box<dyn PositionStore>,
    config: DashboardConfig,
    view: Rc<RefCell<ViewState>>,
    subscription: Option<Subscription>,
    visible: bool,
    position: PanelPosition,
    drag: Option<DragState>,
}

impl Dashboard {
    /// Build an unmounted dashboard, restoring the persisted position.
    pub fn new(registry: Registry, store: impl PositionStore + 'static, config: DashboardConfig) -> Self {
        let position = match load_position(&store) {
            Ok(Some(position)) => position,
            Ok(None) => config.default_position,
            Err(err) => {
                warn!(error = %err, "saved dashboard position unusable, using default");
                config.default_position
            }
        };
        Self {
            registry,
            store: Box::new(store),
            visible: config.start_visible,
            config,
            view: Rc::new(RefCell::new(ViewState::default())),
            subscription: None,
            position,
            drag: None,
        }
    }

    /// Subscribe to the registry and seed from its current state.
    /// Mounting twice is a no-op.
    pub fn mount(&mut self) {
        if self.subscription.is_some() {
            return;
        }
        let view = Rc::clone(&self.view);
        let subscription = self.registry.subscribe(move |snapshot: &Snapshot| {
            let mut view = view.borrow_mut();
            view.snapshot = snapshot.clone();
            view.dirty = true;
            view.generation += 1;
        });
        // Subscribe first, then read: nothing between the two can be missed.
        {
            let mut view = self.view.borrow_mut();
            view.snapshot = self.registry.snapshot();
            view.dirty = true;
            view.generation += 1;
        }
        self.subscription = Some(subscription);
        debug!("dashboard mounted");
    }

    /// Unsubscribe. The last snapshot stays readable.
    pub fn unmount(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
            debug!("dashboard unmounted");
        }
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.subscription.is_some()
    }

    /// Latest snapshot received.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.view.borrow().snapshot.clone()
    }

    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.view.borrow().snapshot.len()
    }

    /// Number of snapshots received (including the mount seed).
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.view.borrow().generation
    }

    /// True if a snapshot arrived since the last call; clears the flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.view.borrow_mut().dirty)
    }

    // -- visibility ---------------------------------------------------------

    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        if self.visible != visible {
            self.visible = visible;
            self.view.borrow_mut().dirty = true;
        }
    }

    /// The close button.
    pub fn close(&mut self) {
        self.set_visible(false);
    }

    /// Ctrl+Shift+S toggles; Escape hides a visible panel.
    pub fn handle_key(&mut self, key: &KeyEvent) -> KeyOutcome {
        if is_toggle(key) {
            let visible = !self.visible;
            self.set_visible(visible);
            return KeyOutcome::Toggled(visible);
        }
        if key.code == KeyCode::Escape && self.visible {
            self.set_visible(false);
            return KeyOutcome::Hidden;
        }
        KeyOutcome::Ignored
    }

    // -- position -----------------------------------------------------------

    #[must_use]
    pub fn position(&self) -> PanelPosition {
        self.position
    }

    #[must_use]
    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Grab the panel at pointer `(x, y)`.
    pub fn begin_drag(&mut self, x: u16, y: u16) {
        self.drag = Some(DragState {
            origin: self.position,
            grab_dx: i32::from(x) - i32::from(self.position.x),
            grab_dy: i32::from(y) - i32::from(self.position.y),
        });
    }

    /// Follow the pointer. Ignored when no drag is active.
    pub fn drag_to(&mut self, x: u16, y: u16) {
        let Some(drag) = self.drag else {
            return;
        };
        self.position = PanelPosition::default().offset(
            i32::from(x) - drag.grab_dx,
            i32::from(y) - drag.grab_dy,
        );
        self.view.borrow_mut().dirty = true;
    }

    /// Drop the panel and persist its position.
    pub fn end_drag(&mut self) {
        if self.drag.take().is_some() {
            self.persist_position();
        }
    }

    /// Abort a drag, restoring the position it started from.
    pub fn cancel_drag(&mut self) {
        if let Some(drag) = self.drag.take() {
            self.position = drag.origin;
            self.view.borrow_mut().dirty = true;
        }
    }

    /// Keyboard nudge; persisted immediately.
    pub fn move_by(&mut self, dx: i32, dy: i32) {
        self.position = self.position.offset(dx, dy);
        self.view.borrow_mut().dirty = true;
        self.persist_position();
    }

    fn persist_position(&mut self) {
        if let Err(err) = save_position(self.store.as_mut(), self.position) {
            warn!(error = %err, "failed to persist dashboard position");
        }
    }

    // -- rendering ----------------------------------------------------------

    /// Render the panel as lines no wider than `width` cells. A hidden
    /// panel renders nothing.
    #[must_use]
    pub fn render(&self, width: usize) -> Vec<String> {
        if !self.visible {
            return Vec::new();
        }
        let view = self.view.borrow();
        let snapshot = &view.snapshot;
        let mut lines = vec![
            format!("{} ({} states)", self.config.title, snapshot.len()),
            "Ctrl+Shift+S toggle | Esc close".to_string(),
            "─".repeat(width),
        ];
        for (key, observation) in snapshot.by_recency() {
            self.render_entry(key, observation, &mut lines);
        }
        if snapshot.is_empty() {
            lines.push(String::new());
            lines.push("No state detected yet".to_string());
            lines.push(String::new());
        }
        lines.push(format!("v{}", self.config.version));
        lines
            .into_iter()
            .map(|line| truncate_to_width(&line, width))
            .collect()
    }

    fn render_entry(&self, key: &str, observation: &Observation, lines: &mut Vec<String>) {
        let marker = if observation.is_initial { " (initial)" } else { "" };
        lines.push(format!(
            "{}{key}{marker}  {}",
            if observation.is_initial { "▌" } else { "│" },
            format_time_of_day(observation.timestamp)
        ));
        lines.push(format!(
            "  {} • {}",
            display_label(observation.component()),
            self.display_location(observation.location())
        ));
        lines.push(format!("  value ({})", observation.type_tag));
        for text in render_value(&observation.value).lines() {
            lines.push(format!("    {text}"));
        }
        lines.push(String::new());
    }

    fn display_location(&self, location: &str) -> String {
        let stripped = self
            .config
            .strip_location_prefixes
            .iter()
            .fold(location, |loc, prefix| loc.strip_prefix(prefix.as_str()).unwrap_or(loc));
        display_label(stripped).to_string()
    }
}

impl std::fmt::Debug for Dashboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dashboard")
            .field("mounted", &self.is_mounted())
            .field("visible", &self.visible)
            .field("position", &self.position)
            .field("entries", &self.entry_count())
            .finish_non_exhaustive()
    }
}

fn is_toggle(key: &KeyEvent) -> bool {
    let chord = Modifiers::CTRL | Modifiers::SHIFT;
    // Terminals often report Ctrl+Shift+S as Ctrl + 'S' with SHIFT folded in.
    (key.is_char('S', Modifiers::CTRL) || key.is_char('s', Modifiers::CTRL))
        && (key.modifiers.contains(chord) || key.code == KeyCode::Char('S'))
}

fn display_label(label: &str) -> &str {
    if label.trim().is_empty() { UNKNOWN } else { label }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::{MemoryStore, POSITION_KEY};
    use serde_json::json;
    use statelog_core::{Attribution, ManualClock, ObservationInput};
    use std::time::Duration;

    fn ctrl_shift_s() -> KeyEvent {
        KeyEvent::new(KeyCode::Char('S')).with_modifiers(Modifiers::CTRL | Modifiers::SHIFT)
    }

    fn dashboard(registry: &Registry) -> Dashboard {
        Dashboard::new(registry.clone(), MemoryStore::new(), DashboardConfig::default())
    }

    #[test]
    fn mount_seeds_and_follows_registry() {
        let registry = Registry::new();
        registry.record("a", ObservationInput::new(json!(1), Attribution::unknown(), true));

        let mut dash = dashboard(&registry);
        assert_eq!(dash.entry_count(), 0);
        dash.mount();
        assert_eq!(dash.entry_count(), 1);
        assert!(dash.take_dirty());
        assert!(!dash.take_dirty());

        registry.record("b", ObservationInput::new(json!(2), Attribution::unknown(), true));
        assert_eq!(dash.entry_count(), 2);
        assert!(dash.take_dirty());
    }

    #[test]
    fn unmount_stops_updates() {
        let registry = Registry::new();
        let mut dash = dashboard(&registry);
        dash.mount();
        dash.mount();
        assert_eq!(registry.subscriber_count(), 1);

        dash.unmount();
        dash.unmount();
        assert_eq!(registry.subscriber_count(), 0);
        let generation = dash.generation();
        registry.record("late", ObservationInput::new(json!(0), Attribution::unknown(), true));
        assert_eq!(dash.generation(), generation);
        assert_eq!(dash.entry_count(), 0);
    }

    #[test]
    fn dropping_dashboard_unsubscribes() {
        let registry = Registry::new();
        let mut dash = dashboard(&registry);
        dash.mount();
        drop(dash);
        assert_eq!(registry.subscriber_count(), 0);
    }

    #[test]
    fn toggle_and_escape() {
        let registry = Registry::new();
        let mut dash = dashboard(&registry);
        assert!(dash.is_visible());

        assert_eq!(dash.handle_key(&ctrl_shift_s()), KeyOutcome::Toggled(false));
        assert_eq!(dash.handle_key(&KeyEvent::new(KeyCode::Escape)), KeyOutcome::Ignored);
        assert_eq!(dash.handle_key(&ctrl_shift_s()), KeyOutcome::Toggled(true));
        assert_eq!(dash.handle_key(&KeyEvent::new(KeyCode::Escape)), KeyOutcome::Hidden);
        assert!(!dash.is_visible());
    }

    #[test]
    fn toggle_accepts_folded_shift() {
        let registry = Registry::new();
        let mut dash = dashboard(&registry);
        let folded = KeyEvent::new(KeyCode::Char('S')).with_modifiers(Modifiers::CTRL);
        assert_eq!(dash.handle_key(&folded), KeyOutcome::Toggled(false));

        let plain_ctrl_s = KeyEvent::new(KeyCode::Char('s')).with_modifiers(Modifiers::CTRL);
        assert_eq!(dash.handle_key(&plain_ctrl_s), KeyOutcome::Ignored);
        assert_eq!(dash.handle_key(&KeyEvent::new(KeyCode::Char('S'))), KeyOutcome::Ignored);
    }

    #[test]
    fn hidden_renders_nothing() {
        let registry = Registry::new();
        let mut dash = dashboard(&registry);
        dash.close();
        assert!(dash.render(40).is_empty());
    }

    #[test]
    fn empty_state_message_and_footer() {
        let registry = Registry::new();
        let mut dash = Dashboard::new(
            registry.clone(),
            MemoryStore::new(),
            DashboardConfig::default().with_version("9.9.9"),
        );
        dash.mount();
        let lines = dash.render(50);
        assert_eq!(lines[0], "State Monitor (0 states)");
        assert!(lines.iter().any(|l| l == "No state detected yet"));
        assert_eq!(lines.last().map(String::as_str), Some("v9.9.9"));
    }

    #[test]
    fn entries_newest_first_with_attribution() {
        let clock = ManualClock::starting_at(Duration::from_secs(3600 * 10));
        let registry = Registry::with_clock(clock.clone());
        let mut dash = Dashboard::new(
            registry.clone(),
            MemoryStore::new(),
            DashboardConfig::default().strip_location_prefix("/home/dev/app"),
        );
        dash.mount();

        registry.record(
            "count",
            ObservationInput::new(json!(0), Attribution::new("Counter", "/home/dev/app/src/counter.rs:4:9"), true),
        );
        clock.advance(Duration::from_secs(5));
        registry.record(
            "todos",
            ObservationInput::new(json!(["a"]), Attribution::new("", ""), false),
        );

        let lines = dash.render(80);
        let todos_at = lines.iter().position(|l| l.starts_with("│todos")).unwrap();
        let count_at = lines.iter().position(|l| l.starts_with("▌count (initial)")).unwrap();
        assert!(todos_at < count_at);
        assert!(lines[todos_at].ends_with("10:00:05"));
        assert_eq!(lines[todos_at + 1], "  Unknown • Unknown");
        assert_eq!(lines[todos_at + 2], "  value (array)");
        assert_eq!(lines[todos_at + 3], "    [");
        assert_eq!(lines[count_at + 1], "  Counter • /src/counter.rs:4:9");
        assert_eq!(lines[count_at + 3], "    0");
    }

    #[test]
    fn render_respects_width() {
        let registry = Registry::new();
        let mut dash = dashboard(&registry);
        dash.mount();
        registry.record(
            "a_very_long_tracking_key_name",
            ObservationInput::new(json!("x".repeat(200)), Attribution::unknown(), true),
        );
        for line in dash.render(24) {
            assert!(crate::text::display_width(&line) <= 24, "{line:?}");
        }
    }

    #[test]
    fn drag_moves_and_persists() {
        let registry = Registry::new();
        let store = MemoryStore::new();
        let mut dash = Dashboard::new(
            registry.clone(),
            store.clone(),
            DashboardConfig::default().with_default_position(PanelPosition::new(10, 5)),
        );

        dash.begin_drag(12, 6);
        dash.drag_to(20, 9);
        assert_eq!(dash.position(), PanelPosition::new(18, 8));
        assert!(store.get(POSITION_KEY).is_none());

        dash.end_drag();
        assert!(!dash.is_dragging());
        assert_eq!(store.get(POSITION_KEY).as_deref(), Some(r#"{"x":18,"y":8}"#));

        // A new dashboard on the same store restores the position.
        let restored = Dashboard::new(registry, store, DashboardConfig::default());
        assert_eq!(restored.position(), PanelPosition::new(18, 8));
    }

    #[test]
    fn drag_clamps_and_cancel_restores() {
        let registry = Registry::new();
        let mut dash = dashboard(&registry);
        dash.move_by(4, 4);
        dash.begin_drag(6, 6);
        dash.drag_to(0, 0);
        assert_eq!(dash.position(), PanelPosition::new(0, 0));
        dash.cancel_drag();
        assert_eq!(dash.position(), PanelPosition::new(4, 4));
    }

    #[test]
    fn corrupt_saved_position_falls_back() {
        let mut store = MemoryStore::new();
        store.save(POSITION_KEY, "nope").unwrap();
        let dash = Dashboard::new(
            Registry::new(),
            store,
            DashboardConfig::default().with_default_position(PanelPosition::new(2, 3)),
        );
        assert_eq!(dash.position(), PanelPosition::new(2, 3));
    }
}
