//! Minimal structural parser for RFC 5424 and RFC 3164 syslog messages.
//!
//! This is not a relay: it identifies fields for routing and leaves policy
//! to the caller. Fields are borrowed slices of the input; absent or `-`
//! fields are `None`.

mod rfc3164;
mod rfc5424;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty input")]
    Empty,

    #[error("malformed priority header")]
    BadPriority,

    #[error("malformed version field")]
    BadVersion,
}

/// Structural fields of one syslog message.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyslogMessage<'a> {
    pub facility: Option<u8>,
    pub severity: Option<u8>,
    /// Present only for RFC 5424 input.
    pub version: Option<u8>,
    pub timestamp: Option<&'a [u8]>,
    pub hostname: Option<&'a [u8]>,
    pub appname: Option<&'a [u8]>,
    pub procid: Option<&'a [u8]>,
    pub msgid: Option<&'a [u8]>,
    pub structured_data: Option<&'a [u8]>,
    pub message: Option<&'a [u8]>,
}

/// Parses a syslog line, auto-detecting the format: a version digit after
/// the PRI means RFC 5424, anything else falls back to RFC 3164.
pub fn parse(input: &[u8]) -> Result<SyslogMessage<'_>, ParseError> {
    let input = trim_line(input);
    if input.is_empty() {
        return Err(ParseError::Empty);
    }

    let (priority, rest) = match parse_priority(input) {
        Ok((pri, rest)) => (Some(pri), rest),
        // RFC 3164 tolerates a missing PRI; 5424 requires one.
        Err(_) => (None, input),
    };

    if priority.is_some() && looks_like_5424(rest) {
        rfc5424::parse(priority, rest)
    } else {
        rfc3164::parse(priority, rest)
    }
}

fn trim_line(input: &[u8]) -> &[u8] {
    let mut end = input.len();
    while end > 0 && (input[end - 1] == b'\n' || input[end - 1] == b'\r') {
        end -= 1;
    }
    &input[..end]
}

/// `<NNN>` with 0 <= NNN <= 191.
fn parse_priority(input: &[u8]) -> Result<(u8, &[u8]), ParseError> {
    if input.first() != Some(&b'<') {
        return Err(ParseError::BadPriority);
    }
    let close = input
        .iter()
        .position(|&b| b == b'>')
        .ok_or(ParseError::BadPriority)?;
    if close < 2 || close > 4 {
        return Err(ParseError::BadPriority);
    }
    let digits = &input[1..close];
    if !digits.iter().all(u8::is_ascii_digit) {
        return Err(ParseError::BadPriority);
    }
    let pri: u16 = std::str::from_utf8(digits)
        .map_err(|_| ParseError::BadPriority)?
        .parse()
        .map_err(|_| ParseError::BadPriority)?;
    if pri > 191 {
        return Err(ParseError::BadPriority);
    }
    Ok((pri as u8, &input[close + 1..]))
}

fn looks_like_5424(rest: &[u8]) -> bool {
    let Some(space) = rest.iter().position(|&b| b == b' ') else {
        return false;
    };
    space > 0 && space <= 2 && rest[..space].iter().all(u8::is_ascii_digit)
}

/// Splits off the next space-delimited field; `-` maps to `None`.
pub(crate) fn take_field(input: &[u8]) -> (Option<&[u8]>, &[u8]) {
    let (field, rest) = match input.iter().position(|&b| b == b' ') {
        Some(pos) => (&input[..pos], &input[pos + 1..]),
        None => (input, &input[input.len()..]),
    };
    let field = match field {
        b"" | b"-" => None,
        f => Some(f),
    };
    (field, rest)
}
