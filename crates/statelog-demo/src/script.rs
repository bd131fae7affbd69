#![forbid(unsafe_code)]

//! Scripted run: a fixed sequence of actions, printing the dashboard after
//! each one. Timestamps come from a manual clock advanced one second per
//! step, so output only varies with attribution.

use std::io::{self, Write};
use std::time::Duration;

use statelog_core::{ManualClock, Registry, TrackOptions};
use statelog_dashboard::{Dashboard, DashboardConfig, MemoryStore};
use tracing::info;

use crate::app::{Action, App};
use crate::cli::VERSION;

/// Steps run by [`run`], with their labels.
pub const STEPS: &[(&str, Action)] = &[
    ("increment counter", Action::Increment),
    ("increment counter", Action::Increment),
    ("add todo", Action::AddTodo),
    ("add todo", Action::AddTodo),
    ("decrement counter", Action::Decrement),
    ("remove todo", Action::RemoveTodo),
    ("unmount todo list", Action::ToggleTodos),
    ("mount todo list", Action::ToggleTodos),
    ("decrement counter", Action::Decrement),
];

/// Start of the scripted day: 09:00:00 UTC.
const SCRIPT_START: Duration = Duration::from_secs(9 * 3600);

/// Run the script, writing frames to `out`.
pub fn run(width: usize, options: TrackOptions, out: &mut impl Write) -> io::Result<()> {
    let clock = ManualClock::starting_at(SCRIPT_START);
    let registry = Registry::with_clock(clock.clone());
    let dashboard = Dashboard::new(
        registry.clone(),
        MemoryStore::new(),
        DashboardConfig::default().with_version(VERSION),
    );
    let mut app = App::new(registry, options, dashboard);
    write_frame(out, 0, "mount", &app, width)?;

    for (index, (label, action)) in STEPS.iter().enumerate() {
        clock.advance(Duration::from_secs(1));
        app.apply(*action);
        write_frame(out, index + 1, label, &app, width)?;
    }
    info!(steps = STEPS.len(), "script finished");
    out.flush()
}

fn write_frame(out: &mut impl Write, step: usize, label: &str, app: &App, width: usize) -> io::Result<()> {
    writeln!(out, "== step {step}: {label} ==")?;
    for line in app.dashboard().render(width) {
        writeln!(out, "{line}")?;
    }
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use statelog_core::Attribution;
    use statelog_core::callsite::FixedResolver;

    fn script_output(width: usize) -> String {
        let options = TrackOptions::new().with_resolver(FixedResolver(Attribution::new("Demo", "demo.rs:1:1")));
        let mut buf = Vec::new();
        run(width, options, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn prints_one_frame_per_step() {
        let out = script_output(60);
        assert_eq!(out.matches("== step ").count(), STEPS.len() + 1);
        assert!(out.starts_with("== step 0: mount ==\nState Monitor (3 states)"));
    }

    #[test]
    fn unmount_frame_drops_todo_keys() {
        let out = script_output(60);
        let frame = out
            .split("== step ")
            .find(|f| f.starts_with("7: unmount todo list"))
            .unwrap();
        assert!(frame.contains("State Monitor (1 states)"));
        assert!(!frame.contains("todos"));
    }

    #[test]
    fn timestamps_advance_per_step() {
        let out = script_output(60);
        let last = out.split("== step ").last().unwrap();
        assert!(last.contains("09:00:09"));
    }
}
