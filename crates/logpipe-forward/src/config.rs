//! Forwarder configuration.

use ipnet::IpNet;
use logpipe_config::{duration_of, ConfigError, KvSection};
use std::net::IpAddr;
use std::time::Duration;

pub const DEFAULT_BUFFER: usize = 256;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
    Tls,
    /// Named-socket path; non-Windows only.
    Unix,
}

impl Protocol {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            "tls" => Ok(Protocol::Tls),
            "unix" => Ok(Protocol::Unix),
            other => Err(format!("unknown protocol {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Bytes as-is plus the configured delimiter.
    #[default]
    Raw,
    /// JSON object with the resolved tag name and base64 data.
    Json,
    /// RFC 5424-style envelope.
    Syslog,
}

impl Encoding {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_ascii_lowercase().as_str() {
            "" | "raw" => Ok(Encoding::Raw),
            "json" => Ok(Encoding::Json),
            "syslog" => Ok(Encoding::Syslog),
            other => Err(format!("unknown format {other:?}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    pub target: String,
    pub protocol: Protocol,
    pub format: Encoding,
    pub delimiter: Vec<u8>,
    /// Queue depth between the chain and the network worker.
    pub buffer: usize,
    /// Drop instead of blocking when the queue is full.
    pub non_blocking: bool,
    pub insecure_skip_tls_verify: bool,
    /// How long close waits for the queue to drain.
    pub timeout: Duration,
    /// Tag names; membership filter.
    pub tag_filters: Vec<String>,
    /// CIDR membership filter.
    pub source_filters: Vec<IpNet>,
    /// OR-ed regex filter over record data.
    pub regex_filters: Vec<String>,
}

impl ForwarderConfig {
    pub fn load(sec: &KvSection) -> Result<Self, ConfigError> {
        let protocol = Protocol::parse(
            &sec.get_string("Protocol")
                .unwrap_or_else(|| "tcp".to_string()),
        )
        .map_err(|e| ConfigError::bad_value(sec.name(), "Protocol", e))?;
        Self::load_with(sec, protocol, None)
    }

    /// The `gravwellforwarder` kind: same plumbing pinned to tcp + json.
    pub fn load_gravwell(sec: &KvSection) -> Result<Self, ConfigError> {
        Self::load_with(sec, Protocol::Tcp, Some(Encoding::Json))
    }

    fn load_with(
        sec: &KvSection,
        protocol: Protocol,
        format: Option<Encoding>,
    ) -> Result<Self, ConfigError> {
        if cfg!(windows) && protocol == Protocol::Unix {
            return Err(ConfigError::bad_value(
                sec.name(),
                "Protocol",
                "unix sockets are not available on windows",
            ));
        }
        let format = match format {
            Some(f) => f,
            None => Encoding::parse(&sec.get_string("Format").unwrap_or_default())
                .map_err(|e| ConfigError::bad_value(sec.name(), "Format", e))?,
        };

        let delimiter = unescape_delimiter(
            &sec.get_string("Delimiter")
                .unwrap_or_else(|| "\\n".to_string()),
        );

        let mut source_filters = Vec::new();
        for raw in sec.get_strings("Source") {
            let net = parse_net(raw.trim()).ok_or_else(|| {
                ConfigError::bad_value(sec.name(), "Source", format!("{raw:?} is not an IP or CIDR"))
            })?;
            source_filters.push(net);
        }

        Ok(Self {
            target: sec.require_string("Target")?,
            protocol,
            format,
            delimiter,
            buffer: sec.get_usize("Buffer", DEFAULT_BUFFER)?,
            non_blocking: sec.get_bool("Non-Blocking", false)?,
            insecure_skip_tls_verify: sec.get_bool("Insecure-Skip-TLS-Verify", false)?,
            timeout: duration_of(sec, "Timeout")?.unwrap_or(DEFAULT_TIMEOUT),
            tag_filters: sec.get_strings("Tag"),
            source_filters,
            regex_filters: sec.get_strings("Regex"),
        })
    }
}

fn parse_net(s: &str) -> Option<IpNet> {
    if let Ok(net) = s.parse::<IpNet>() {
        return Some(net);
    }
    s.parse::<IpAddr>().ok().map(IpNet::from)
}

/// Delimiters arrive as config text; resolve the usual backslash escapes.
fn unescape_delimiter(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => out.push(b'\n'),
            Some('r') => out.push(b'\r'),
            Some('t') => out.push(b'\t'),
            Some('0') => out.push(0),
            Some('\\') => out.push(b'\\'),
            Some(other) => {
                out.push(b'\\');
                let mut buf = [0u8; 4];
                out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
            None => out.push(b'\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_section() -> KvSection {
        let mut sec = KvSection::new("fwd");
        sec.push_str("type", "forwarder");
        sec.push_str("Target", "collector.example.com:7777");
        sec
    }

    #[test]
    fn test_defaults() {
        let cfg = ForwarderConfig::load(&base_section()).unwrap();
        assert_eq!(cfg.protocol, Protocol::Tcp);
        assert_eq!(cfg.format, Encoding::Raw);
        assert_eq!(cfg.delimiter, b"\n");
        assert_eq!(cfg.buffer, DEFAULT_BUFFER);
        assert!(!cfg.non_blocking);
        assert_eq!(cfg.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_missing_target_fails() {
        let mut sec = KvSection::new("fwd");
        sec.push_str("type", "forwarder");
        assert!(ForwarderConfig::load(&sec).is_err());
    }

    #[test]
    fn test_filters_and_options() {
        let mut sec = base_section();
        sec.push_str("Protocol", "udp");
        sec.push_str("Format", "syslog");
        sec.push_str("Delimiter", "\\r\\n");
        sec.push_str("Non-Blocking", "true");
        sec.push_str("Timeout", "5s");
        sec.push_str("Tag", "syslog");
        sec.push_str("Tag", "auth");
        sec.push_str("Source", "10.0.0.0/8");
        sec.push_str("Regex", "ERROR");
        let cfg = ForwarderConfig::load(&sec).unwrap();
        assert_eq!(cfg.protocol, Protocol::Udp);
        assert_eq!(cfg.format, Encoding::Syslog);
        assert_eq!(cfg.delimiter, b"\r\n");
        assert!(cfg.non_blocking);
        assert_eq!(cfg.timeout, Duration::from_secs(5));
        assert_eq!(cfg.tag_filters, vec!["syslog", "auth"]);
        assert_eq!(cfg.source_filters.len(), 1);
        assert_eq!(cfg.regex_filters, vec!["ERROR"]);
    }

    #[test]
    fn test_bad_protocol_fails() {
        let mut sec = base_section();
        sec.push_str("Protocol", "carrier-pigeon");
        assert!(ForwarderConfig::load(&sec).is_err());
    }

    #[test]
    fn test_gravwell_preset_pins_tcp_json() {
        let cfg = ForwarderConfig::load_gravwell(&base_section()).unwrap();
        assert_eq!(cfg.protocol, Protocol::Tcp);
        assert_eq!(cfg.format, Encoding::Json);
    }
}
