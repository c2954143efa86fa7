use std::time::{Duration, SystemTime, UNIX_EPOCH};

crate::arg_wrapper!(ArgDuration, Duration, humantime::parse_duration);

/// Seconds since the Unix epoch, saturating to zero for clocks set before 1970.
pub fn unix_timestamp(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub fn format_duration(duration: Duration) -> String {
    humantime::format_duration(duration).to_string()
}
