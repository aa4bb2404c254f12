//! Value grammars: Go-style durations and human byte sizes.

use std::time::Duration;

/// Parses `1s`, `500ms`, `10m` style durations.
pub fn parse_go_duration(s: &str) -> Result<Duration, String> {
    humantime::parse_duration(s.trim()).map_err(|e| e.to_string())
}

/// Parses byte sizes: a plain integer, or an integer with a
/// `KB`/`MB`/`GB`/`TB` (or `KiB`-style) suffix. All suffixes are
/// 1024-based.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size".to_string());
    }
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (digits, suffix) = s.split_at(split);
    if digits.is_empty() {
        return Err(format!("size {s:?} has no leading digits"));
    }
    let n: u64 = digits
        .parse()
        .map_err(|e| format!("size {s:?}: {e}"))?;

    let mult: u64 = match suffix.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1024,
        "M" | "MB" | "MIB" => 1024 * 1024,
        "G" | "GB" | "GIB" => 1024 * 1024 * 1024,
        "T" | "TB" | "TIB" => 1024u64.pow(4),
        other => return Err(format!("unknown size suffix {other:?}")),
    };
    n.checked_mul(mult)
        .ok_or_else(|| format!("size {s:?} overflows"))
}
