#![forbid(unsafe_code)]

//! Best-effort call-site attribution.
//!
//! When a tracked variable is declared, the adapter asks a
//! [`CallSiteResolver`] who declared it. The answer is an [`Attribution`]:
//! a human-readable component label plus a source location. It is a
//! diagnostic aid only and is never guaranteed to be exact.
//!
//! # Resolvers
//!
//! | Resolver | Component | Location |
//! |----------|-----------|----------|
//! | [`BacktraceResolver`] | first foreign stack frame's type or function | that frame's `path:line:col` |
//! | [`CallerLocationResolver`] | file stem of the declaring call | the declaring call's `path:line:col` |
//! | [`FixedResolver`] | preset | preset |
//! | [`DisabledResolver`] | `Unknown` | `Unknown` |
//!
//! # Invariants
//!
//! 1. Resolution never fails: missing stack data or an exhausted frame scan
//!    yields [`Attribution::unknown`].
//! 2. Resolution is synchronous and must happen on the declaring call path;
//!    deferring it loses the intended frame.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | No stack | backtraces unsupported on the target | `Unknown`/`Unknown` |
//! | Stripped symbols | release build without debug info | `<unknown>` and process-entry frames skipped, `Unknown`/`Unknown` |
//! | Every frame filtered | only internal frames on the stack | `Unknown`/`Unknown` |

use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic::Location;
use std::path::Path;

/// Sentinel label used when attribution is unavailable.
pub const UNKNOWN: &str = "Unknown";

/// Frame markers that belong to the resolver machinery rather than the
/// code being attributed.
const INTERNAL_MARKERS: &[&str] = &[
    "statelog_core::",
    "std::backtrace",
    "backtrace_rs",
    "std::rt::",
    "std::panicking",
    "std::panic::",
    "std::sys",
    "core::ops::function",
    "__rust_begin_short_backtrace",
    "__rust_try",
];

/// Process and thread entry points. Stripped builds leave only these
/// symbolized, and they never name application code.
const ENTRY_PREFIXES: &[&str] = &[
    "__libc_start",
    "_start",
    "__start",
    "start_thread",
    "__clone",
    "clone3",
    "thread_start",
    "__scrt_common_main",
    "BaseThreadInitThunk",
    "RtlUserThreadStart",
];

fn is_entry_frame(frame: &Frame) -> bool {
    let symbol = frame.symbol.trim();
    symbol.contains("lang_start")
        || ENTRY_PREFIXES.iter().any(|p| symbol.starts_with(p))
        || (symbol == "main" && frame.location.is_none())
}

/// Where and what produced an observation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Attribution {
    /// Owning logical unit (component, type or function name).
    pub component: String,
    /// Source location, usually `path:line:col`.
    pub location: String,
}

impl Attribution {
    /// Explicit labels.
    #[must_use]
    pub fn new(component: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            location: location.into(),
        }
    }

    /// The degraded-but-valid `Unknown`/`Unknown` pair.
    #[must_use]
    pub fn unknown() -> Self {
        Self::new(UNKNOWN, UNKNOWN)
    }

    /// True when both labels are the sentinel.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.component == UNKNOWN && self.location == UNKNOWN
    }
}

impl Default for Attribution {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Source location of the declaring call, captured with `#[track_caller]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    location: &'static Location<'static>,
}

impl CallSite {
    /// The caller of the function this is invoked from.
    #[track_caller]
    #[must_use]
    pub fn here() -> Self {
        Self {
            location: Location::caller(),
        }
    }

    /// Wrap an already captured location.
    #[must_use]
    pub const fn from_location(location: &'static Location<'static>) -> Self {
        Self { location }
    }

    #[must_use]
    pub fn file(&self) -> &'static str {
        self.location.file()
    }

    #[must_use]
    pub fn line(&self) -> u32 {
        self.location.line()
    }

    #[must_use]
    pub fn column(&self) -> u32 {
        self.location.column()
    }

    /// `path:line:col`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}:{}:{}", self.file(), self.line(), self.column())
    }
}

/// Derives an [`Attribution`] for a declaring call.
pub trait CallSiteResolver {
    /// Resolve attribution. Must be called synchronously on the declaring
    /// call path.
    fn resolve(&self, site: &CallSite) -> Attribution;
}

// ---------------------------------------------------------------------------
// Stack text parsing
// ---------------------------------------------------------------------------

/// One frame of a textual stack trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame number as printed (inlined symbols share their frame's number).
    pub index: usize,
    /// Demangled symbol text.
    pub symbol: String,
    /// `path:line:col` when the trace carried file information.
    pub location: Option<String>,
}

impl Frame {
    fn mentions(&self, marker: &str) -> bool {
        self.symbol.contains(marker)
            || self
                .location
                .as_deref()
                .is_some_and(|loc| loc.contains(marker))
    }
}

/// Parse the text form of a [`Backtrace`].
///
/// Accepts lines of the form `  N: symbol`, continuation symbols for inlined
/// frames (no number), and `at path:line:col` lines attaching a location to
/// the preceding symbol. Anything else is ignored.
#[must_use]
pub fn parse_frames(text: &str) -> Vec<Frame> {
    let mut frames: Vec<Frame> = Vec::new();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(loc) = line.strip_prefix("at ") {
            if let Some(last) = frames.last_mut()
                && last.location.is_none()
            {
                last.location = Some(loc.trim().to_string());
            }
            continue;
        }
        if let Some((num, symbol)) = line.split_once(": ")
            && let Ok(index) = num.parse::<usize>()
        {
            frames.push(Frame {
                index,
                symbol: symbol.trim().to_string(),
                location: None,
            });
            continue;
        }
        // Inlined symbol sharing the previous frame number.
        if let Some(prev) = frames.last().map(|f| f.index) {
            frames.push(Frame {
                index: prev,
                symbol: line.to_string(),
                location: None,
            });
        }
    }
    frames
}

/// Strip a trailing `::h<16 hex>` symbol hash.
fn strip_hash(symbol: &str) -> &str {
    if let Some((head, tail)) = symbol.rsplit_once("::h")
        && tail.len() == 16
        && tail.bytes().all(|b| b.is_ascii_hexdigit())
    {
        return head;
    }
    symbol
}

/// Remove `<...>` groups (generic arguments), respecting nesting.
fn strip_generics(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut depth = 0usize;
    for ch in path.chars() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out
}

/// Extract a component label from a demangled symbol.
///
/// `<T as Trait>::method` resolves to `T`. Otherwise the last path segment
/// that names a type (leading uppercase) wins, falling back to the function
/// name. Closure markers and symbol hashes are ignored.
#[must_use]
pub fn component_from_symbol(symbol: &str) -> Option<String> {
    let symbol = strip_hash(symbol.trim());
    let path = match symbol.strip_prefix('<') {
        Some(rest) => match rest.split_once(" as ") {
            Some((self_ty, _)) => self_ty.to_string(),
            None => rest.replacen('>', "", 1),
        },
        None => symbol.to_string(),
    };
    let path = strip_generics(&path);
    let segments: Vec<&str> = path
        .split("::")
        .map(str::trim)
        .filter(|seg| !seg.is_empty() && !seg.starts_with('{'))
        .collect();
    segments
        .iter()
        .rev()
        .find(|seg| seg.starts_with(|c: char| c.is_ascii_uppercase()))
        .or_else(|| segments.last())
        .map(|seg| (*seg).to_string())
}

/// Pick the attribution frame: skip `skip` innermost frames, then the first
/// frame mentioning none of `markers` and carrying a real symbol.
#[must_use]
pub fn select_frame<'a>(frames: &'a [Frame], skip: usize, markers: &[String]) -> Option<&'a Frame> {
    frames.iter().skip(skip).find(|frame| {
        frame.symbol != "<unknown>"
            && !is_entry_frame(frame)
            && !INTERNAL_MARKERS.iter().any(|m| frame.mentions(m))
            && !markers.iter().any(|m| frame.mentions(m))
    })
}

// ---------------------------------------------------------------------------
// Resolvers
// ---------------------------------------------------------------------------

/// Walks the live stack and attributes the first frame outside the
/// tracking machinery.
#[derive(Debug, Clone, Default)]
pub struct BacktraceResolver {
    skip_frames: usize,
    markers: Vec<String>,
}

impl BacktraceResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip this many innermost frames before scanning.
    #[must_use]
    pub fn with_skip_frames(mut self, skip: usize) -> Self {
        self.skip_frames = skip;
        self
    }

    /// Also skip frames whose text mentions `marker` (e.g. an app's own
    /// wrapper around the tracking API).
    #[must_use]
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.markers.push(marker.into());
        self
    }

    /// Attribute from already captured stack text.
    #[must_use]
    pub fn resolve_text(&self, text: &str, site: &CallSite) -> Attribution {
        let frames = parse_frames(text);
        let Some(frame) = select_frame(&frames, self.skip_frames, &self.markers) else {
            return Attribution::unknown();
        };
        let component = component_from_symbol(&frame.symbol).unwrap_or_else(|| UNKNOWN.into());
        let location = frame.location.clone().unwrap_or_else(|| site.label());
        Attribution {
            component,
            location,
        }
    }
}

impl CallSiteResolver for BacktraceResolver {
    fn resolve(&self, site: &CallSite) -> Attribution {
        let trace = Backtrace::force_capture();
        if trace.status() != BacktraceStatus::Captured {
            return Attribution::unknown();
        }
        self.resolve_text(&trace.to_string(), site)
    }
}

/// Attributes from the `#[track_caller]` location alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallerLocationResolver;

impl CallSiteResolver for CallerLocationResolver {
    fn resolve(&self, site: &CallSite) -> Attribution {
        let component = Path::new(site.file())
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(UNKNOWN);
        Attribution::new(component, site.label())
    }
}

/// Always returns the same, caller-supplied attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedResolver(pub Attribution);

impl CallSiteResolver for FixedResolver {
    fn resolve(&self, _site: &CallSite) -> Attribution {
        self.0.clone()
    }
}

/// Attribution switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledResolver;

impl CallSiteResolver for DisabledResolver {
    fn resolve(&self, _site: &CallSite) -> Attribution {
        Attribution::unknown()
    }
}
