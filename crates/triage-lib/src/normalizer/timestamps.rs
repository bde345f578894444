//! Log timestamp heuristics and time-window strings

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

/// Best-effort timestamp extraction from a log line.
///
/// Recognized, in order: envoy access logs (`[2024-05-01T10:00:00.123Z] ...`),
/// a leading RFC 3339 token, `YYYY-MM-DD HH:MM:SS[.f]`, and klog headers
/// (`I0501 10:00:00.123456 ...`). klog carries no year, so `reference`
/// supplies it.
pub fn extract_timestamp(line: &str, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let line = line.trim_start();

    if let Some(rest) = line.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            if let Some(ts) = parse_rfc3339(&rest[..end]) {
                return Some(ts);
            }
        }
    }

    let mut tokens = line.split_whitespace();
    let first = tokens.next()?;
    if let Some(ts) = parse_rfc3339(first) {
        return Some(ts);
    }

    if let Some(second) = tokens.next() {
        let time_part = second.split(',').next().unwrap_or(second);
        let joined = format!("{} {}", first, time_part);
        if let Ok(naive) = NaiveDateTime::parse_from_str(&joined, "%Y-%m-%d %H:%M:%S%.f") {
            return Some(Utc.from_utc_datetime(&naive));
        }
        if let Some(ts) = parse_klog(first, second, reference) {
            return Some(ts);
        }
    }

    None
}

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim_end_matches(','))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_klog(header: &str, time: &str, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let mut chars = header.chars();
    let level = chars.next()?;
    if !matches!(level, 'I' | 'W' | 'E' | 'F') {
        return None;
    }
    let digits = chars.as_str();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let month: u32 = digits[..2].parse().ok()?;
    let day: u32 = digits[2..].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(reference.year(), month, day)?;
    let time = NaiveTime::parse_from_str(time, "%H:%M:%S%.f").ok()?;
    Some(Utc.from_utc_datetime(&date.and_time(time)))
}

/// Parse a window such as `"30m"`, `"24h"`, `"7d"`, `"2w"` or `"90s"`
pub fn parse_window(window: &str) -> Option<Duration> {
    let w = window.trim();
    let unit = w.chars().last()?;
    let amount: i64 = w[..w.len() - unit.len_utf8()].parse().ok()?;
    if amount < 0 {
        return None;
    }
    match unit {
        's' => Some(Duration::seconds(amount)),
        'm' => Some(Duration::minutes(amount)),
        'h' => Some(Duration::hours(amount)),
        'd' => Some(Duration::days(amount)),
        'w' => Some(Duration::weeks(amount)),
        _ => None,
    }
}
