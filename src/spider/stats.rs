//! Run statistics: named counters shared by all workers.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use dashmap::DashMap;

/// Counter incremented for every network attempt.
pub const REQUEST_NETWORK: &str = "request-network";
/// Counter incremented for responses with an accepted status.
pub const REQUEST_OK: &str = "request-ok";
/// Counter incremented when a task is queued again after a failed attempt.
pub const NETWORK_RETRY: &str = "network-retry";
/// Counter of tasks dropped for exceeding the task try limit.
pub const TASK_COUNT_REJECTED: &str = "task-count-rejected";
/// Counter of handler calls that returned an error.
pub const HANDLER_ERROR: &str = "error:handler-error";
/// Total response body bytes received.
pub const DOWNLOAD_SIZE: &str = "download-size";

const KB: u64 = 1000;
const MB: u64 = 1000 * KB;
const GB: u64 = 1000 * MB;

/// Process-wide counters keyed by name, e.g. `error:read-timeout-error`.
#[derive(Debug, Default)]
pub struct SpiderStats {
    counters: DashMap<String, u64>,
}

impl SpiderStats {
    /// Creates empty statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one to `key`.
    pub fn inc(&self, key: &str) {
        self.inc_by(key, 1);
    }

    /// Adds `count` to `key`.
    pub fn inc_by(&self, key: &str, count: u64) {
        *self.counters.entry(key.to_string()).or_insert(0) += count;
    }

    /// Current value of `key`, zero when never incremented.
    #[must_use]
    pub fn get(&self, key: &str) -> u64 {
        self.counters.get(key).map_or(0, |value| *value)
    }

    /// Whether `key` was ever incremented.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.counters.contains_key(key)
    }

    /// Sorted copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Human-readable summary, one counter per line.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in self.snapshot() {
            if key == DOWNLOAD_SIZE {
                let _ = writeln!(out, "{key}: {}", format_traffic_value(value));
            } else {
                let _ = writeln!(out, "{key}: {value}");
            }
        }
        out
    }
}

/// Formats a byte count in decimal units: `B`, `KB`, `MB` or `GB`.
///
/// Values are rounded to two decimals and always show at least one.
#[must_use]
pub fn format_traffic_value(bytes: u64) -> String {
    let (divisor, unit) = match bytes {
        b if b < KB => return format!("{b} B"),
        b if b < MB => (KB, "KB"),
        b if b < GB => (MB, "MB"),
        _ => (GB, "GB"),
    };
    let value = (bytes as f64 / divisor as f64 * 100.0).round() / 100.0;
    if value.fract() == 0.0 {
        format!("{value:.1} {unit}")
    } else {
        format!("{value} {unit}")
    }
}
