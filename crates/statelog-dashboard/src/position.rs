#![forbid(unsafe_code)]

//! Persisted panel position.
//!
//! The dashboard remembers where it was dragged to. The position is stored
//! as JSON under [`POSITION_KEY`] in a host key-value store implementing
//! [`PositionStore`].
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Missing entry | First run | Default position |
//! | Unreadable store | I/O error | `StoreError::Io`, dashboard falls back to default |
//! | Corrupt entry | Invalid JSON | `StoreError::Parse`, dashboard falls back to default |

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// Store key for the dashboard position.
pub const POSITION_KEY: &str = "statelog.dashboard.position";

/// Top-left corner of the panel, in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PanelPosition {
    pub x: u16,
    pub y: u16,
}

impl PanelPosition {
    #[must_use]
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    /// Shift by a signed delta, clamping at the origin.
    #[must_use]
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: clamp_axis(i32::from(self.x) + dx),
            y: clamp_axis(i32::from(self.y) + dy),
        }
    }
}

fn clamp_axis(v: i32) -> u16 {
    v.clamp(0, i32::from(u16::MAX)) as u16
}

/// Errors from position persistence.
#[derive(Debug)]
pub enum StoreError {
    /// Reading or writing the backing storage failed.
    Io(io::Error),
    /// Stored data could not be decoded.
    Parse(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "store I/O error: {err}"),
            Self::Parse(msg) => write!(f, "store parse error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(_) => None,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Host key-value storage.
pub trait PositionStore {
    /// Raw value under `key`, if any.
    fn load(&self, key: &str) -> Result<Option<String>, StoreError>;
    /// Store `value` under `key`.
    fn save(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Decode the stored position, `Ok(None)` when nothing was saved.
pub fn load_position(store: &dyn PositionStore) -> Result<Option<PanelPosition>, StoreError> {
    match store.load(POSITION_KEY)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Encode and store a position.
pub fn save_position(store: &mut dyn PositionStore, position: PanelPosition) -> Result<(), StoreError> {
    let raw = serde_json::to_string(&position)?;
    store.save(POSITION_KEY, &raw)
}

/// In-memory store. Clones share contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }
}

impl PositionStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get(key))
    }

    fn save(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A JSON object file mapping keys to string values.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }
}

impl PositionStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_all()?.remove(key))
    }

    fn save(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut all = self.read_all()?;
        all.insert(key.to_string(), value.to_string());
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&all)?)?;
        Ok(())
    }
}
