//! Multipart header parsing.
//!
//! Header shape:
//!
//! ```text
//! <MMM DD HH:MM:SS>[ <±HH:MM>] <host> <category> <messageId> <total> <seq> <body>
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<ts>\S+\s\d+\s\d+:\d+:\d+)(\s[-+]?\d+:\d+)?\s(?P<host>\S+)\s(?P<cat>\S+)\s(?P<msgid>\d+)\s(?P<total>\d+)\s(?P<seq>\d+)\s(?P<body>.+)$",
    )
    .expect("multipart header regex")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    /// The line is not a multipart header at all, or `total` is zero.
    #[error("invalid multipart header")]
    InvalidHeader,

    /// Counters are present but inconsistent (`seq` past `total`).
    #[error("invalid multipart sequence counter")]
    InvalidSequence,
}

/// One parsed fragment, borrowing the input line.
#[derive(Debug, PartialEq, Eq)]
pub struct Fragment<'a> {
    pub ts: &'a str,
    pub host: &'a str,
    pub category: &'a str,
    pub msg_id: u64,
    pub total: u32,
    pub seq: u32,
    pub body: &'a str,
}

/// Parses one syslog line as a multipart fragment.
pub fn parse_header(line: &str) -> Result<Fragment<'_>, HeaderError> {
    let caps = HEADER_RE.captures(line).ok_or(HeaderError::InvalidHeader)?;

    let group = |name: &str| caps.name(name).map(|m| m.as_str()).unwrap_or_default();
    let msg_id: u64 = group("msgid").parse().map_err(|_| HeaderError::InvalidHeader)?;
    let total: u32 = group("total").parse().map_err(|_| HeaderError::InvalidHeader)?;
    let seq: u32 = group("seq").parse().map_err(|_| HeaderError::InvalidSequence)?;

    if total == 0 {
        return Err(HeaderError::InvalidHeader);
    }
    // seq is a 0-indexed fragment counter; valid range is [0, total).
    if seq >= total {
        return Err(HeaderError::InvalidSequence);
    }

    Ok(Fragment {
        ts: group("ts"),
        host: group("host"),
        category: group("cat"),
        msg_id,
        total,
        seq,
        body: group("body"),
    })
}
