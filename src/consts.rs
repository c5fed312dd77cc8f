//! Project-wide constants.

use std::path::PathBuf;
use std::time::Duration;

pub const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");
pub const HOMEPAGE: &str = env!("CARGO_PKG_HOMEPAGE");
pub const REPO: &str = env!("CARGO_PKG_REPOSITORY");

/// How long a call may wait for its correlated response.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Engine-side function that receives outbound messages.
pub const DEFAULT_POST_MESSAGE: &str = "bridge.postMessage";

/// Closed range accepted for the zoom factor.
pub const ZOOM_MIN: f64 = 0.1;
pub const ZOOM_MAX: f64 = 5.0;
pub const DEFAULT_ZOOM: f64 = 1.0;

/// Transposition bounds in semitones (two octaves either way).
pub const TRANSPOSE_MIN: i32 = -24;
pub const TRANSPOSE_MAX: i32 = 24;

/// Container-size changes at or below this many units are ignored.
pub const RESIZE_THRESHOLD: f64 = 1.0;

/// Quiet period before a container size is forwarded.
pub const RESIZE_DEBOUNCE: Duration = Duration::from_millis(150);

/// Yield after readiness so pending state can settle before re-applying it.
pub const SETTLE_DELAY: Duration = Duration::from_millis(1);

/// Longest command text echoed into logs.
pub const LOG_PREVIEW_CHARS: usize = 80;

/// Default database path: `~/.scorebridge/scorebridge.db`.
/// Falls back to the temp dir when there is no home directory.
pub fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".scorebridge")
        .join("scorebridge.db")
}

/// Format a number with comma separators (e.g. 1,234,567).
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i).is_multiple_of(3) {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// First `max` characters of `text`, with an ellipsis when cut.
pub fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
