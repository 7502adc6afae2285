//! Fixed-window arithmetic.
//!
//! Times are unix seconds. A window that ends at `deadline` still admits
//! requests at `now == deadline` and is expired once `now > deadline`.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Local, TimeZone};

use crate::WindowSizeSeconds;

/// Format used for reset times in headers and rejection bodies.
pub const RESET_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Deadline of a window that starts at `now`.
pub fn deadline(now: i64, window: WindowSizeSeconds) -> i64 {
    now.saturating_add(window.as_secs_i64())
}

/// Whether a window ending at `deadline` has elapsed at `now`.
pub fn is_expired(now: i64, deadline: i64) -> bool {
    now > deadline
}

/// Current wall-clock time in unix seconds.
pub fn unix_now() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX),
        Err(before_epoch) => -i64::try_from(before_epoch.duration().as_secs()).unwrap_or(i64::MAX),
    }
}

/// Render `deadline` as `YYYY-MM-DD HH:MM:SS` in the local time zone.
///
/// Out-of-range timestamps render as an empty string.
pub fn format_reset_time(deadline: i64) -> String {
    match Local.timestamp_opt(deadline, 0).earliest() {
        Some(at) => at.format(RESET_TIME_FORMAT).to_string(),
        None => String::new(),
    }
}
