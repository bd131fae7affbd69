#![forbid(unsafe_code)]

//! Key events consumed by the dashboard.
//!
//! Hosts translate their own input into [`KeyEvent`]s. With the `crossterm`
//! feature, [`KeyEvent::from_crossterm`] does it for Crossterm input.

use bitflags::bitflags;

bitflags! {
    /// Modifier keys held during a key press.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const ALT = 0b0010;
        const CTRL = 0b0100;
        const SUPER = 0b1000;
    }
}

/// Key identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Char(char),
    Enter,
    Escape,
    Backspace,
    Tab,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    F(u8),
}

/// A key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub modifiers: Modifiers,
}

impl KeyEvent {
    /// A press without modifiers.
    #[must_use]
    pub const fn new(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: Modifiers::empty(),
        }
    }

    #[must_use]
    pub const fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// True for `Char(c)` with exactly `modifiers` held (ignoring SHIFT,
    /// which terminals fold into the character case).
    #[must_use]
    pub fn is_char(&self, c: char, modifiers: Modifiers) -> bool {
        let held = self.modifiers - Modifiers::SHIFT;
        matches!(self.code, KeyCode::Char(got) if got == c) && held == modifiers - Modifiers::SHIFT
    }
}

#[cfg(all(feature = "crossterm", not(target_arch = "wasm32")))]
impl KeyEvent {
    /// Translate a Crossterm key event. Releases and unmapped keys yield
    /// `None`.
    #[must_use]
    pub fn from_crossterm(event: &crossterm::event::KeyEvent) -> Option<Self> {
        use crossterm::event::{KeyCode as Ct, KeyEventKind, KeyModifiers};

        if event.kind == KeyEventKind::Release {
            return None;
        }
        let code = match event.code {
            Ct::Char(c) => KeyCode::Char(c),
            Ct::Enter => KeyCode::Enter,
            Ct::Esc => KeyCode::Escape,
            Ct::Backspace => KeyCode::Backspace,
            Ct::Tab => KeyCode::Tab,
            Ct::Up => KeyCode::Up,
            Ct::Down => KeyCode::Down,
            Ct::Left => KeyCode::Left,
            Ct::Right => KeyCode::Right,
            Ct::Home => KeyCode::Home,
            Ct::End => KeyCode::End,
            Ct::F(n) => KeyCode::F(n),
            _ => return None,
        };
        let mut modifiers = Modifiers::empty();
        if event.modifiers.contains(KeyModifiers::SHIFT) {
            modifiers |= Modifiers::SHIFT;
        }
        if event.modifiers.contains(KeyModifiers::ALT) {
            modifiers |= Modifiers::ALT;
        }
        if event.modifiers.contains(KeyModifiers::CONTROL) {
            modifiers |= Modifiers::CTRL;
        }
        if event.modifiers.contains(KeyModifiers::SUPER) {
            modifiers |= Modifiers::SUPER;
        }
        Some(Self { code, modifiers })
    }
}
