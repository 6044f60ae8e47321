use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, the time unit used on the wire
pub type TimeMs = u64;

/// Current wall-clock time in milliseconds
pub fn time_now_ms() -> TimeMs {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
