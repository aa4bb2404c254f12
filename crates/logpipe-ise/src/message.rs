//! The inner ISE message grammar and the raw/CEF/JSON emitters.
//!
//! A merged message looks like
//!
//! ```text
//! 2020-06-12 10:41:06.420 +00:00 0123456789 5200 NOTICE Passed-Authentication: text, k=v, k=v, …
//! ```
//!
//! Values may escape commas as `\,`; attribute splitting honours
//! non-escaped commas and non-escaped equals only.

use glob::Pattern;
use logpipe_config::{ConfigError, KvSection};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

static MESSAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<ts>\d+-\d+-\d+\s\d+:\d+:\d+(\.\d+)?(\s[-+]?\d+:\d+)?)\s(?P<seq>\d+)\s(?P<ode>\S+)\s(?P<sev>\S+)\s(?P<class>[^:]+):\s(?P<body>.+)$",
    )
    .expect("inner message regex")
});

/// Output rendering for merged messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Emit as received.
    #[default]
    Raw,
    Cef,
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_ascii_lowercase().as_str() {
            "" | "raw" => Ok(OutputFormat::Raw),
            "cef" => Ok(OutputFormat::Cef),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format {other:?}")),
        }
    }
}

/// Attribute post-processing applied before CEF/JSON emission.
#[derive(Debug, Default)]
pub struct AttributeOptions {
    /// Glob patterns; an attribute whose raw or unescaped `k=v` form
    /// matches any pattern is removed.
    pub drop_filters: Vec<Pattern>,
    /// Unwrap cascading `key=key=value` chains in values.
    pub strip_header: bool,
}

impl AttributeOptions {
    pub fn load(sec: &KvSection) -> Result<Self, ConfigError> {
        let mut drop_filters = Vec::new();
        for raw in sec.get_strings("Attribute-Drop-Filter") {
            let pat = Pattern::new(&raw).map_err(|e| {
                ConfigError::bad_value(sec.name(), "Attribute-Drop-Filter", e.to_string())
            })?;
            drop_filters.push(pat);
        }
        Ok(Self {
            drop_filters,
            strip_header: sec.get_bool("Attribute-Strip-Header", false)?,
        })
    }

    fn dropped(&self, raw_pair: &str, clean_pair: &str) -> bool {
        self.drop_filters
            .iter()
            .any(|p| p.matches(raw_pair) || p.matches(clean_pair))
    }
}

/// One decoded inner message. Attribute keys and values are kept in their
/// raw (still escaped) form; emitters unescape as needed.
#[derive(Debug, PartialEq, Eq)]
pub struct IseMessage {
    pub ts: String,
    pub seq: u32,
    pub ode: String,
    pub severity: String,
    pub class: String,
    pub text: String,
    pub attrs: Vec<(String, String)>,
}

/// Parses a merged message; `None` when the grammar does not apply.
pub fn parse_message(input: &str) -> Option<IseMessage> {
    let caps = MESSAGE_RE.captures(input)?;
    let group = |name: &str| caps.name(name).map(|m| m.as_str()).unwrap_or_default();

    let body = group("body");
    let mut text = String::new();
    let mut attrs = Vec::new();
    for piece in split_unescaped(body, ',') {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        if text.is_empty() {
            text = piece.to_string();
            continue;
        }
        match split_once_unescaped(piece, '=') {
            Some((k, v)) => attrs.push((k.trim().to_string(), v.trim().to_string())),
            // A comma-piece without an equals is a continuation of the text.
            None => {
                text.push_str(", ");
                text.push_str(piece);
            }
        }
    }

    Some(IseMessage {
        ts: group("ts").to_string(),
        seq: group("seq").parse().ok()?,
        ode: group("ode").to_string(),
        severity: group("sev").to_string(),
        class: group("class").to_string(),
        text,
        attrs,
    })
}

/// Splits on `sep` outside `\` escapes.
fn split_unescaped(s: &str, sep: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            c if c == sep => {
                out.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    out.push(&s[start..]);
    out
}

fn split_once_unescaped(s: &str, sep: char) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            c if c == sep => return Some((&s[..i], &s[i + c.len_utf8()..])),
            _ => {}
        }
    }
    None
}

/// Resolves `\,`, `\\`, `\"`, `\'` escape sequences.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(n @ (',' | '\\' | '"' | '\'')) => out.push(n),
            Some(n) => {
                out.push('\\');
                out.push(n);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Strips cascading `key=` prefixes from a value until the remainder no
/// longer starts with an alphabetic run, never stripping into values that
/// open with `(` or `{`.
fn strip_value_header(v: &str) -> &str {
    let mut cur = v;
    loop {
        let Some(eq) = cur.find('=') else {
            return cur;
        };
        let key = &cur[..eq];
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphabetic()) {
            return cur;
        }
        let rest = &cur[eq + 1..];
        if rest.starts_with('(') || rest.starts_with('{') {
            return cur;
        }
        cur = rest;
        if !cur.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
            return cur;
        }
    }
}

/// Post-processed attributes ready for emission.
fn clean_attrs(msg: &IseMessage, opts: &AttributeOptions) -> Vec<(String, String)> {
    let mut out = Vec::with_capacity(msg.attrs.len());
    for (k, v) in &msg.attrs {
        let mut value = unescape(v);
        if opts.strip_header {
            value = strip_value_header(&value).to_string();
        }
        let key = unescape(k);
        let raw_pair = format!("{k}={v}");
        let clean_pair = format!("{key}={value}");
        if opts.dropped(&raw_pair, &clean_pair) {
            continue;
        }
        out.push((key, value));
    }
    out
}

/// CEF rendering:
/// `CEF:0|CISCO|ISE_DEVICE|||<class>|<severity>| sequence=… ode=… class=… text=…[ k=v]*`
pub fn render_cef(msg: &IseMessage, opts: &AttributeOptions) -> Vec<u8> {
    let mut out = String::with_capacity(128);
    out.push_str("CEF:0|CISCO|ISE_DEVICE|||");
    out.push_str(&msg.class);
    out.push('|');
    out.push_str(&msg.severity);
    out.push_str("| sequence=");
    out.push_str(&msg.seq.to_string());
    out.push_str(" ode=");
    out.push_str(&cef_value(&msg.ode));
    out.push_str(" class=");
    out.push_str(&cef_value(&msg.class));
    out.push_str(" text=");
    out.push_str(&cef_value(&msg.text));
    for (k, v) in clean_attrs(msg, opts) {
        out.push(' ');
        out.push_str(&cef_key(&k));
        out.push('=');
        out.push_str(&cef_value(&v));
    }
    out.into_bytes()
}

/// Keys lose their spaces entirely.
fn cef_key(k: &str) -> String {
    k.chars().filter(|c| *c != ' ').collect()
}

/// Values escape `=` as `\=`.
fn cef_value(v: &str) -> String {
    v.replace('=', "\\=")
}

#[derive(Serialize)]
struct JsonMessage<'a> {
    #[serde(rename = "TS")]
    ts: &'a str,
    #[serde(rename = "Sequence")]
    sequence: u32,
    #[serde(rename = "ODE")]
    ode: &'a str,
    #[serde(rename = "Severity")]
    severity: &'a str,
    #[serde(rename = "Class")]
    class: &'a str,
    #[serde(rename = "Text")]
    text: &'a str,
    #[serde(rename = "Attributes")]
    attributes: AttrMap,
}

/// Insertion-ordered attribute object.
struct AttrMap(Vec<(String, String)>);

impl Serialize for AttrMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// JSON rendering with unescaped, filtered attributes.
pub fn render_json(msg: &IseMessage, opts: &AttributeOptions) -> Vec<u8> {
    let doc = JsonMessage {
        ts: &msg.ts,
        sequence: msg.seq,
        ode: &msg.ode,
        severity: &msg.severity,
        class: &msg.class,
        text: &msg.text,
        attributes: AttrMap(clean_attrs(msg, opts)),
    };
    serde_json::to_vec(&doc).unwrap_or_else(|_| msg.text.clone().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MERGED: &str = "2020-06-12 10:41:06.420 +00:00 0123456789 5200 NOTICE Passed-Authentication: Authentication succeeded, ConfigVersionId=99, Step=11001\\, 11017, NAS-IP-Address=10.0.0.1";

    #[test]
    fn test_parse_message_fields() {
        let m = parse_message(MERGED).unwrap();
        assert_eq!(m.ts, "2020-06-12 10:41:06.420 +00:00");
        assert_eq!(m.seq, 123_456_789);
        assert_eq!(m.ode, "5200");
        assert_eq!(m.severity, "NOTICE");
        assert_eq!(m.class, "Passed-Authentication");
        assert_eq!(m.text, "Authentication succeeded");
        assert_eq!(
            m.attrs,
            vec![
                ("ConfigVersionId".to_string(), "99".to_string()),
                ("Step".to_string(), "11001\\, 11017".to_string()),
                ("NAS-IP-Address".to_string(), "10.0.0.1".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_rejects_non_matching() {
        assert!(parse_message("not an ise message").is_none());
        assert!(parse_message("").is_none());
    }

    #[test]
    fn test_escaped_equals_stays_in_value() {
        let m = parse_message(
            "2020-06-12 10:41:06 1 ODE WARN Cls: t, key=a\\=b",
        )
        .unwrap();
        assert_eq!(m.attrs, vec![("key".to_string(), "a\\=b".to_string())]);
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r"a\,b"), "a,b");
        assert_eq!(unescape(r"a\\b"), r"a\b");
        assert_eq!(unescape(r#"\"x\""#), r#""x""#);
        assert_eq!(unescape(r"\'y\'"), "'y'");
        assert_eq!(unescape(r"\n"), r"\n");
    }

    #[test]
    fn test_strip_value_header() {
        assert_eq!(strip_value_header("a=b=c=value"), "value");
        assert_eq!(strip_value_header("plain"), "plain");
        // Never strips into values opening a group.
        assert_eq!(strip_value_header("key=(nested=x)"), "key=(nested=x)");
        assert_eq!(strip_value_header("key={json}"), "key={json}");
        // Stops once the remainder is non-alphabetic.
        assert_eq!(strip_value_header("key=123"), "123");
        assert_eq!(strip_value_header("UPPER=lower=9"), "9");
    }

    #[test]
    fn test_cef_rendering() {
        let m = parse_message(
            "2020-06-12 10:41:06 7 ODE NOTICE Cls: some text, A Key=va=lue, Plain=x",
        )
        .unwrap();
        let out = String::from_utf8(render_cef(&m, &AttributeOptions::default())).unwrap();
        assert_eq!(
            out,
            "CEF:0|CISCO|ISE_DEVICE|||Cls|NOTICE| sequence=7 ode=ODE class=Cls text=some text AKey=va\\=lue Plain=x"
        );
    }

    #[test]
    fn test_json_rendering() {
        let m = parse_message(
            "2020-06-12 10:41:06.420 +00:00 7 ODE NOTICE Cls: the text, Step=11001\\, 11017, K=v",
        )
        .unwrap();
        let out = render_json(&m, &AttributeOptions::default());
        let doc: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(doc["TS"], "2020-06-12 10:41:06.420 +00:00");
        assert_eq!(doc["Sequence"], 7);
        assert_eq!(doc["ODE"], "ODE");
        assert_eq!(doc["Severity"], "NOTICE");
        assert_eq!(doc["Class"], "Cls");
        assert_eq!(doc["Text"], "the text");
        assert_eq!(doc["Attributes"]["Step"], "11001, 11017");
        assert_eq!(doc["Attributes"]["K"], "v");
    }

    #[test]
    fn test_attribute_drop_filter() {
        let m = parse_message(
            "2020-06-12 10:41:06 7 ODE NOTICE Cls: t, Step=1, NAS-IP-Address=10.0.0.1, Keep=yes",
        )
        .unwrap();
        let opts = AttributeOptions {
            drop_filters: vec![
                Pattern::new("Step=*").unwrap(),
                Pattern::new("NAS-*").unwrap(),
            ],
            strip_header: false,
        };
        let out = render_json(&m, &opts);
        let doc: serde_json::Value = serde_json::from_slice(&out).unwrap();
        let attrs = doc["Attributes"].as_object().unwrap();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs["Keep"], "yes");
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!(OutputFormat::parse("raw").unwrap(), OutputFormat::Raw);
        assert_eq!(OutputFormat::parse("CEF").unwrap(), OutputFormat::Cef);
        assert_eq!(OutputFormat::parse("json").unwrap(), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("").unwrap(), OutputFormat::Raw);
        assert!(OutputFormat::parse("xml").is_err());
    }
}
