//! Duration formatting for reports, notices and the badge.

/// `HH:MM:SS`. Hours are not wrapped at 24.
pub fn format_hms(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

/// `Xh Ymin`, dropping a zero part; `<1min` below one minute.
pub fn format_hours_minutes(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    match (hours, minutes) {
        (0, 0) => "<1min".to_string(),
        (0, m) => format!("{}min", m),
        (h, 0) => format!("{}h", h),
        (h, m) => format!("{}h {}min", h, m),
    }
}

/// Badge text: total minutes and seconds, `MM:SS` (minutes keep growing past 99).
pub fn badge_text(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
