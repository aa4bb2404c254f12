//! RFC 3164 field walk. The wild west: every field is optional and the
//! parser never rejects, it just stops identifying.

use super::{ParseError, SyslogMessage};

pub(super) fn parse(priority: Option<u8>, input: &[u8]) -> Result<SyslogMessage<'_>, ParseError> {
    let mut msg = SyslogMessage {
        facility: priority.map(|p| p >> 3),
        severity: priority.map(|p| p & 7),
        ..SyslogMessage::default()
    };

    // `MMM dd HH:MM:SS` is fixed-width with spaces at offsets 3 and 6.
    let mut rest = input;
    if rest.len() >= 15
        && rest.get(3) == Some(&b' ')
        && rest.get(6) == Some(&b' ')
        && rest[..3].iter().all(u8::is_ascii_alphabetic)
    {
        msg.timestamp = Some(&rest[..15]);
        rest = rest.get(16..).unwrap_or(b"");
    }

    // `hostname TAG: content` / `TAG: content` / bare content.
    match rest.iter().position(|&b| b == b':') {
        Some(colon) => {
            let head = &rest[..colon];
            let content = &rest[colon + 1..];
            msg.message = Some(content.strip_prefix(b" ").unwrap_or(content));

            let (hostname, tag) = match head.iter().rposition(|&b| b == b' ') {
                Some(space) => (Some(&head[..space]), &head[space + 1..]),
                None => (None, head),
            };
            msg.hostname = hostname.filter(|h| !h.is_empty());
            let (tag, procid) = split_pid(tag);
            msg.appname = if tag.is_empty() { None } else { Some(tag) };
            msg.procid = procid;
        }
        None => {
            msg.message = if rest.is_empty() { None } else { Some(rest) };
        }
    }

    Ok(msg)
}

/// `tag[1234]` carries the process id in brackets.
fn split_pid(tag: &[u8]) -> (&[u8], Option<&[u8]>) {
    if tag.last() == Some(&b']') {
        if let Some(open) = tag.iter().position(|&b| b == b'[') {
            return (&tag[..open], Some(&tag[open + 1..tag.len() - 1]));
        }
    }
    (tag, None)
}
