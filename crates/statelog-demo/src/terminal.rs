#![forbid(unsafe_code)]

//! Interactive Crossterm front end.
//!
//! Raw mode, alternate screen, and mouse capture are held by a
//! [`TerminalSession`] and restored on drop, including on early return.
//! The dashboard floats over the component area at its stored position and
//! can be dragged by its title row.

use std::io::{self, Stdout, Write};
use std::time::Duration;

use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::style::Print;
use crossterm::terminal::{
    self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode,
    enable_raw_mode,
};
use crossterm::{execute, queue};
use statelog_dashboard::text::truncate_to_width;
use statelog_dashboard::KeyEvent;
use tracing::{debug, warn};

use crate::app::{App, Flow};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Terminal modes held for the lifetime of the session.
pub struct TerminalSession {
    out: Stdout,
}

impl TerminalSession {
    pub fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        let mut out = io::stdout();
        if let Err(err) = execute!(out, EnterAlternateScreen, EnableMouseCapture, Hide) {
            let _ = disable_raw_mode();
            return Err(err);
        }
        Ok(Self { out })
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        if let Err(err) = execute!(self.out, Show, DisableMouseCapture, LeaveAlternateScreen) {
            warn!(error = %err, "failed to restore terminal screen");
        }
        if let Err(err) = disable_raw_mode() {
            warn!(error = %err, "failed to leave raw mode");
        }
    }
}

/// Run the event loop until the user quits.
pub fn run(app: &mut App, width: usize) -> io::Result<()> {
    let mut session = TerminalSession::enter()?;
    draw(&mut session.out, app, width)?;
    loop {
        if !event::poll(POLL_INTERVAL)? {
            if app.dashboard_mut().take_dirty() {
                draw(&mut session.out, app, width)?;
            }
            continue;
        }
        match event::read()? {
            Event::Key(raw) => {
                let Some(key) = KeyEvent::from_crossterm(&raw) else {
                    continue;
                };
                if app.handle_key(&key) == Flow::Quit {
                    debug!("quit requested");
                    return Ok(());
                }
            }
            Event::Mouse(mouse) => handle_mouse(app, &mouse, width),
            Event::Resize(cols, rows) => debug!(cols, rows, "resize"),
            _ => continue,
        }
        app.dashboard_mut().take_dirty();
        draw(&mut session.out, app, width)?;
    }
}

fn handle_mouse(app: &mut App, mouse: &MouseEvent, width: usize) {
    let dashboard = app.dashboard_mut();
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            let pos = dashboard.position();
            let on_title = mouse.row == pos.y
                && mouse.column >= pos.x
                && usize::from(mouse.column - pos.x) < width;
            if dashboard.is_visible() && on_title {
                dashboard.begin_drag(mouse.column, mouse.row);
            }
        }
        MouseEventKind::Drag(MouseButton::Left) => dashboard.drag_to(mouse.column, mouse.row),
        MouseEventKind::Up(MouseButton::Left) => dashboard.end_drag(),
        _ => {}
    }
}

fn draw(out: &mut impl Write, app: &App, width: usize) -> io::Result<()> {
    let (cols, rows) = terminal::size()?;
    queue!(out, Clear(ClearType::All))?;
    for (row, line) in app.body_lines().iter().enumerate().take(usize::from(rows)) {
        queue!(out, MoveTo(0, row as u16), Print(truncate_to_width(line, usize::from(cols))))?;
    }

    let pos = app.dashboard().position();
    let room = usize::from(cols.saturating_sub(pos.x)).min(width);
    if room > 0 {
        for (offset, line) in app.dashboard().render(room).iter().enumerate() {
            let row = usize::from(pos.y) + offset;
            if row >= usize::from(rows) {
                break;
            }
            queue!(out, MoveTo(pos.x, row as u16), Print(line))?;
        }
    }
    out.flush()
}
