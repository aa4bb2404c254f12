//! RFC 5424 field walk.

use super::{take_field, ParseError, SyslogMessage};

pub(super) fn parse(priority: Option<u8>, input: &[u8]) -> Result<SyslogMessage<'_>, ParseError> {
    let space = input
        .iter()
        .position(|&b| b == b' ')
        .ok_or(ParseError::BadVersion)?;
    let version: u8 = std::str::from_utf8(&input[..space])
        .map_err(|_| ParseError::BadVersion)?
        .parse()
        .map_err(|_| ParseError::BadVersion)?;
    let mut rest = &input[space + 1..];

    let mut msg = SyslogMessage {
        facility: priority.map(|p| p >> 3),
        severity: priority.map(|p| p & 7),
        version: Some(version),
        ..SyslogMessage::default()
    };

    let (timestamp, r) = take_field(rest);
    msg.timestamp = timestamp;
    rest = r;
    let (hostname, r) = take_field(rest);
    msg.hostname = hostname;
    rest = r;
    let (appname, r) = take_field(rest);
    msg.appname = appname;
    rest = r;
    let (procid, r) = take_field(rest);
    msg.procid = procid;
    rest = r;
    let (msgid, r) = take_field(rest);
    msg.msgid = msgid;
    rest = r;

    let (structured, message) = split_structured(rest);
    msg.structured_data = structured;
    msg.message = message;

    Ok(msg)
}

/// Splits `[id k="v"][id2 ...] message` or `- message`. Escaped `\]` inside
/// param values does not close an element.
fn split_structured(rest: &[u8]) -> (Option<&[u8]>, Option<&[u8]>) {
    if rest.is_empty() {
        return (None, None);
    }
    if rest[0] == b'-' {
        let message = rest
            .get(2..)
            .filter(|m| !m.is_empty())
            .map(strip_bom);
        return (None, message);
    }
    if rest[0] != b'[' {
        // No structured data at all; everything is message.
        return (None, Some(strip_bom(rest)));
    }

    let mut i = 0;
    while i < rest.len() && rest[i] == b'[' {
        let mut escaped = false;
        let mut closed = false;
        i += 1;
        while i < rest.len() {
            match rest[i] {
                b'\\' if !escaped => escaped = true,
                b']' if !escaped => {
                    closed = true;
                    i += 1;
                    break;
                }
                _ => escaped = false,
            }
            i += 1;
        }
        if !closed {
            // Unterminated element; treat the whole tail as structured data.
            return (Some(rest), None);
        }
    }

    let structured = Some(&rest[..i]);
    let message = rest
        .get(i + 1..)
        .filter(|m| !m.is_empty())
        .map(strip_bom);
    (structured, message)
}

fn strip_bom(msg: &[u8]) -> &[u8] {
    msg.strip_prefix(&[0xef, 0xbb, 0xbf][..]).unwrap_or(msg)
}
