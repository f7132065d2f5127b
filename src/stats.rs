//! # Run Statistics
//!
//! Thread-safe running totals shared by every worker of a run, and the
//! summary rendered once the run is complete.

use std::sync::Mutex;

use serde::Serialize;

const BYTE_UNITS: [&str; 9] = ["B", "kB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunningTotals {
    pub bytes_in: u64,
    pub bytes_saved: u64,
    pub item_count: u64,
}

/// Size change of one transformed item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemDelta {
    pub original_size: u64,
    pub optimized_size: u64,
}

impl ItemDelta {
    pub fn new(original_size: u64, optimized_size: u64) -> Self {
        Self {
            original_size,
            optimized_size,
        }
    }

    /// Bytes saved; negative when the output grew.
    pub fn saved(&self) -> i64 {
        self.original_size as i64 - self.optimized_size as i64
    }

    pub fn percent(&self) -> f64 {
        percent_of(self.saved() as f64, self.original_size)
    }

    /// Per-item diagnostic text, e.g. `saved 1.2 kB - 12.5%`.
    pub fn message(&self) -> String {
        let saved = self.saved();
        if saved > 0 {
            format!(
                "saved {} - {}%",
                format_bytes(saved as u64),
                format_percent(self.percent())
            )
        } else {
            "already optimized".to_string()
        }
    }
}

#[derive(Debug, Default)]
pub struct Aggregator {
    totals: Mutex<RunningTotals>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed item. Growth counts as zero bytes saved.
    pub fn apply_delta(&self, original_size: u64, saved: i64) {
        let mut totals = self.totals.lock().unwrap_or_else(|e| e.into_inner());
        totals.bytes_in = totals.bytes_in.saturating_add(original_size);
        totals.bytes_saved = totals.bytes_saved.saturating_add(saved.max(0) as u64);
        totals.item_count += 1;
    }

    pub fn apply(&self, delta: &ItemDelta) {
        self.apply_delta(delta.original_size, delta.saved());
    }

    pub fn totals(&self) -> RunningTotals {
        *self.totals.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::from(self.totals())
    }
}

/// Final totals of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunSummary {
    pub item_count: u64,
    pub bytes_in: u64,
    pub bytes_saved: u64,
    pub percent: f64,
}

impl From<RunningTotals> for RunSummary {
    fn from(totals: RunningTotals) -> Self {
        Self {
            item_count: totals.item_count,
            bytes_in: totals.bytes_in,
            bytes_saved: totals.bytes_saved,
            percent: percent_of(totals.bytes_saved as f64, totals.bytes_in),
        }
    }
}

impl RunSummary {
    pub fn message(&self) -> String {
        let noun = if self.item_count == 1 { "image" } else { "images" };
        format!(
            "Minified {} {} (saved {} - {}%)",
            self.item_count,
            noun,
            format_bytes(self.bytes_saved),
            format_percent(self.percent)
        )
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message())
    }
}

fn percent_of(part: f64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part / whole as f64 * 100.0
    }
}

/// One decimal place, with a trailing `.0` dropped.
pub fn format_percent(value: f64) -> String {
    let text = format!("{value:.1}");
    match text.strip_suffix(".0") {
        Some(trimmed) => trimmed.to_string(),
        None => text,
    }
}

/// Human-readable decimal byte count, e.g. `512 B`, `1.5 kB`, `1.23 MB`.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1000 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    let text = format!("{value:.2}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", text, BYTE_UNITS[unit])
}
