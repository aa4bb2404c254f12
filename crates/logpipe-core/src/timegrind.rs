//! Timestamp recognition: the external time-grinder interface plus a
//! chrono-backed implementation good enough for isolated timestamp fields.

use crate::entry::Timestamp;
use chrono::{DateTime, Datelike, NaiveDateTime, TimeZone, Utc};

/// Heuristic timestamp extraction. Implementations may keep per-instance
/// state (the shipped one remembers its last successful format), so the
/// receiver is mutable.
pub trait TimeGrinder: Send {
    fn extract(&mut self, data: &[u8]) -> Option<Timestamp>;
}

/// Parses `s` against an explicit chrono layout. Layouts carrying a zone
/// are honoured; zone-less layouts are interpreted as UTC.
pub fn parse_with_layout(s: &str, layout: &str) -> Option<Timestamp> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_str(s, layout) {
        return Some(Timestamp::from_datetime(&dt));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, layout) {
        return Some(Timestamp::from_datetime(&naive.and_utc()));
    }
    None
}

// Zone-less layouts tried in order; the grinder sticks to whichever hit
// last. Year-less syslog stamps are handled separately.
const LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%d %b %Y %H:%M:%S%.f",
    "%a %b %e %H:%M:%S %Y",
];

const ZONED_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%d %H:%M:%S%.f %:z",
];

/// Chrono-backed [`TimeGrinder`]. Tries RFC3339 and RFC2822, a fixed layout
/// table, year-less syslog stamps, and bare unix epoch numbers.
#[derive(Debug, Default)]
pub struct AutoGrinder {
    last_hit: usize,
}

impl AutoGrinder {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_layouts(&mut self, s: &str) -> Option<Timestamp> {
        let order = (0..LAYOUTS.len()).map(|i| (self.last_hit + i) % LAYOUTS.len());
        for i in order {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, LAYOUTS[i]) {
                self.last_hit = i;
                return Some(Timestamp::from_datetime(&naive.and_utc()));
            }
        }
        for layout in ZONED_LAYOUTS {
            if let Ok(dt) = DateTime::parse_from_str(s, layout) {
                return Some(Timestamp::from_datetime(&dt));
            }
        }
        None
    }
}

impl TimeGrinder for AutoGrinder {
    fn extract(&mut self, data: &[u8]) -> Option<Timestamp> {
        let s = std::str::from_utf8(data).ok()?.trim();
        if s.is_empty() {
            return None;
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(Timestamp::from_datetime(&dt));
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
            return Some(Timestamp::from_datetime(&dt));
        }
        if let Some(ts) = self.try_layouts(s) {
            return Some(ts);
        }
        if let Some(ts) = parse_yearless_syslog(s) {
            return Some(ts);
        }
        parse_epoch(s)
    }
}

/// `MMM dd HH:MM:SS` carries no year; assume the current one.
fn parse_yearless_syslog(s: &str) -> Option<Timestamp> {
    let with_year = format!("{} {}", Utc::now().year(), s);
    let naive = NaiveDateTime::parse_from_str(&with_year, "%Y %b %e %H:%M:%S").ok()?;
    Some(Timestamp::from_datetime(&naive.and_utc()))
}

/// Bare unix epoch: seconds, milliseconds, or nanoseconds by digit count.
fn parse_epoch(s: &str) -> Option<Timestamp> {
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: i64 = s.parse().ok()?;
    let ts = match s.len() {
        1..=10 => Utc.timestamp_opt(n, 0).single()?,
        11..=13 => Utc.timestamp_millis_opt(n).single()?,
        14..=19 => Utc.timestamp_nanos(n),
        _ => return None,
    };
    Some(Timestamp::from_datetime(&ts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_layout_zoned() {
        let ts = parse_with_layout("2023-09-05 11:22:33.5 +02:00", "%Y-%m-%d %H:%M:%S%.f %:z")
            .unwrap();
        assert_eq!(ts.sec, 1_693_905_753);
        assert_eq!(ts.nsec, 500_000_000);
    }

    #[test]
    fn test_parse_with_layout_naive_is_utc() {
        let ts = parse_with_layout("2023-09-05 11:22:33", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(ts.sec, 1_693_912_953);
    }

    #[test]
    fn test_extract_rfc3339() {
        let mut g = AutoGrinder::new();
        let ts = g.extract(b"2003-10-11T22:14:15.003Z").unwrap();
        assert_eq!(ts.sec, 1_065_910_455);
        assert_eq!(ts.nsec, 3_000_000);
    }

    #[test]
    fn test_extract_table_layout() {
        let mut g = AutoGrinder::new();
        let ts = g.extract(b"2023-09-05 11:22:33.25").unwrap();
        assert_eq!(ts.sec, 1_693_912_953);
        assert_eq!(ts.nsec, 250_000_000);
        // Sticky: same layout again.
        assert!(g.extract(b"2023-09-05 12:00:00").is_some());
    }

    #[test]
    fn test_extract_epoch_seconds_and_millis() {
        let mut g = AutoGrinder::new();
        assert_eq!(g.extract(b"1693912953").unwrap().sec, 1_693_912_953);
        let ts = g.extract(b"1693912953123").unwrap();
        assert_eq!(ts.sec, 1_693_912_953);
        assert_eq!(ts.nsec, 123_000_000);
    }

    #[test]
    fn test_extract_garbage_is_none() {
        let mut g = AutoGrinder::new();
        assert!(g.extract(b"not a time").is_none());
        assert!(g.extract(b"").is_none());
        assert!(g.extract(&[0xff, 0xfe]).is_none());
    }
}
