//! Dotted extraction paths over JSON documents.
//!
//! A path is a dot-separated list of object keys. Double-quoting a segment
//! permits literal dots: `"foo.bar".bar` names key `bar` under key
//! `foo.bar`.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSpec {
    raw: String,
    segs: Vec<String>,
}

impl PathSpec {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("empty extraction path".to_string());
        }
        let mut segs = Vec::new();
        let mut cur = String::new();
        let mut quoted = false;
        let mut chars = raw.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '"' => {
                    quoted = !quoted;
                }
                '.' if !quoted => {
                    if cur.is_empty() {
                        return Err(format!("path {raw:?} has an empty segment"));
                    }
                    segs.push(std::mem::take(&mut cur));
                }
                _ => cur.push(c),
            }
        }
        if quoted {
            return Err(format!("path {raw:?} has an unterminated quote"));
        }
        if cur.is_empty() {
            return Err(format!("path {raw:?} has an empty segment"));
        }
        segs.push(cur);

        Ok(Self {
            raw: raw.to_string(),
            segs,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The final segment, the key emitted values are stored under.
    pub fn last(&self) -> &str {
        self.segs.last().map(String::as_str).unwrap_or_default()
    }

    /// Walks the document; `None` on any missing or non-object step.
    pub fn lookup<'a>(&self, doc: &'a Value) -> Option<&'a Value> {
        let mut cur = doc;
        for seg in &self.segs {
            cur = cur.as_object()?.get(seg)?;
        }
        Some(cur)
    }
}

/// Appends a JSON token for `v` verbatim: strings re-quoted, everything
/// else as its canonical token text.
pub fn write_json_token(out: &mut Vec<u8>, v: &Value) {
    // Infallible for Value over a Vec sink.
    if serde_json::to_writer(&mut *out, v).is_err() {
        out.extend_from_slice(b"null");
    }
}

/// The bare form used when a single extraction replaces the record body:
/// string content without quotes, any other value as its JSON token.
pub fn bare_value_bytes(v: &Value) -> Vec<u8> {
    match v {
        Value::String(s) => s.as_bytes().to_vec(),
        other => {
            let mut out = Vec::new();
            write_json_token(&mut out, other);
            out
        }
    }
}

/// String form used for hashing and route keys: string content unquoted,
/// other values as token text.
pub fn value_key_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
