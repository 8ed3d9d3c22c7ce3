use std::time::Duration;

use thiserror::Error;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const KB: u64 = 1024;
const MB: u64 = 1024 * 1024;
const GB: u64 = 1024 * 1024 * 1024;

/// Width of one column in the live per-tick table.
pub const CELL_WIDTH: usize = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecognized size label: {0:?}")]
pub struct SizeLabelError(pub String);

/// Formats a byte count with the kernel's status-file unit labels.
///
/// The value is truncated to the largest unit it strictly exceeds, so
/// `parse_size(&format_size(n))` is `n` rounded down to that unit.
pub fn format_size(bytes: u64) -> String {
    if bytes > GB {
        format!("{} gB", bytes / GB)
    } else if bytes > MB {
        format!("{} mB", bytes / MB)
    } else if bytes > KB {
        format!("{} kB", bytes / KB)
    } else {
        format!("{bytes} B")
    }
}

/// Parses a `<integer> <unit>` label such as `1024 kB` into bytes.
///
/// Only ` B`, ` kB`, ` mB` and ` gB` are accepted, spelled exactly so.
pub fn parse_size(label: &str) -> Result<u64, SizeLabelError> {
    let (digits, scale) = if let Some(n) = label.strip_suffix(" gB") {
        (n, GB)
    } else if let Some(n) = label.strip_suffix(" mB") {
        (n, MB)
    } else if let Some(n) = label.strip_suffix(" kB") {
        (n, KB)
    } else if let Some(n) = label.strip_suffix(" B") {
        (n, 1)
    } else {
        return Err(SizeLabelError(label.to_string()));
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SizeLabelError(label.to_string()));
    }
    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(scale))
        .ok_or_else(|| SizeLabelError(label.to_string()))
}

/// Parses a run length such as `30`, `30s`, `5m` or `1h`.
///
/// Sampling is whole-second, so sub-second units and zero are rejected.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let s = raw.trim();
    if s.ends_with("ms") || s.ends_with("us") || s.ends_with("ns") {
        return None;
    }
    let (digits, scale) = if let Some(v) = s.strip_suffix('h') {
        (v, 3600)
    } else if let Some(v) = s.strip_suffix('m') {
        (v, 60)
    } else if let Some(v) = s.strip_suffix('s') {
        (v, 1)
    } else {
        (s, 1)
    };
    let secs = digits.trim().parse::<u64>().ok()?.checked_mul(scale)?;
    if secs == 0 {
        return None;
    }
    Some(Duration::from_secs(secs))
}

pub fn truncate_unicode(s: &str, max_width: usize) -> String {
    if s.width() <= max_width {
        return s.to_string();
    }
    let mut result = String::new();
    let mut width = 0;
    for ch in s.chars() {
        let ch_width = ch.width().unwrap_or(0);
        if width + ch_width > max_width.saturating_sub(1) {
            result.push('\u{2026}');
            break;
        }
        result.push(ch);
        width += ch_width;
    }
    result
}

/// Truncates or right-pads `s` to exactly [`CELL_WIDTH`] display columns.
pub fn pad_cell(s: &str) -> String {
    let mut cell = truncate_unicode(s, CELL_WIDTH);
    let width = cell.width();
    cell.extend(std::iter::repeat_n(' ', CELL_WIDTH.saturating_sub(width)));
    cell
}
