use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Render a byte count with binary units, two decimals (`1.50 KiB`).
pub fn human_readable_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes as f64;
    for unit in &UNITS[..UNITS.len() - 1] {
        if size < 1024.0 {
            return format!("{size:.2} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.2} {}", UNITS[UNITS.len() - 1])
}

/// Wall-clock rendering in the operator's zone, e.g. `2024-03-04 21:30:00 EST`.
pub fn format_local(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S %Z").to_string()
}

/// Squash an error body onto one line (whitespace runs become one space) and
/// keep at most `max_chars` characters, marking the cut with `…`.
pub fn one_line_excerpt(input: &str, max_chars: usize) -> String {
    let squashed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    match squashed.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &squashed[..cut]),
        None => squashed,
    }
}

/// Shared cancellation switch for long-running pass work.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
