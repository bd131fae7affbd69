#![forbid(unsafe_code)]

//! Display-width helpers for fixed-width panels.

use unicode_width::UnicodeWidthStr;

/// Width of `text` in terminal cells.
#[inline]
#[must_use]
pub fn display_width(text: &str) -> usize {
    text.width()
}

/// Cut `text` to at most `width` cells, marking the cut with `…`.
#[must_use]
pub fn truncate_to_width(text: &str, width: usize) -> String {
    if display_width(text) <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let budget = width - 1;
    let mut out = String::new();
    for ch in text.chars() {
        out.push(ch);
        // Measure the whole prefix: some sequences are narrower together
        // than their chars summed.
        if display_width(&out) > budget {
            out.pop();
            break;
        }
    }
    out.push('…');
    while display_width(&out) > width {
        out.pop();
        out.pop();
        out.push('…');
    }
    out
}
