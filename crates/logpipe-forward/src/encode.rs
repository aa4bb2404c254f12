//! Wire encodings for forwarded records.

use crate::config::Encoding;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use logpipe_core::{Record, Tag, Tagger};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Serialize)]
struct JsonRecord<'a> {
    #[serde(rename = "Tag")]
    tag: &'a str,
    #[serde(rename = "TS")]
    ts: String,
    #[serde(rename = "SRC")]
    src: String,
    #[serde(rename = "Data")]
    data: String,
}

/// Stateful encoder: owns the output scratch buffer and a tag-name cache.
pub struct Encoder {
    encoding: Encoding,
    delimiter: Vec<u8>,
    tagger: Arc<dyn Tagger>,
    names: HashMap<Tag, String>,
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new(encoding: Encoding, delimiter: Vec<u8>, tagger: Arc<dyn Tagger>) -> Self {
        Self {
            encoding,
            delimiter,
            tagger,
            names: HashMap::new(),
            buf: Vec::new(),
        }
    }

    fn tag_name(&mut self, tag: Tag) -> String {
        if let Some(name) = self.names.get(&tag) {
            return name.clone();
        }
        let name = self.tagger.lookup(tag).unwrap_or_else(|| tag.to_string());
        self.names.insert(tag, name.clone());
        name
    }

    /// Encodes one record into the internal buffer and returns it.
    pub fn encode(&mut self, rec: &Record) -> &[u8] {
        self.buf.clear();
        match self.encoding {
            Encoding::Raw => {
                self.buf.extend_from_slice(&rec.data);
                self.buf.extend_from_slice(&self.delimiter);
            }
            Encoding::Json => {
                let name = self.tag_name(rec.tag);
                let doc = JsonRecord {
                    tag: &name,
                    ts: rec.ts.rfc3339_nano(),
                    src: rec.src.to_string(),
                    data: B64.encode(&rec.data),
                };
                if serde_json::to_writer(&mut self.buf, &doc).is_ok() {
                    self.buf.push(b'\n');
                } else {
                    self.buf.clear();
                }
            }
            Encoding::Syslog => {
                let name = self.tag_name(rec.tag);
                self.buf.extend_from_slice(b"<134>1 ");
                self.buf.extend_from_slice(rec.ts.rfc3339_nano().as_bytes());
                self.buf.extend_from_slice(b" gravwell ");
                self.buf.extend_from_slice(name.as_bytes());
                self.buf.extend_from_slice(b" - - - ");
                self.buf.extend_from_slice(&rec.data);
                self.buf.push(b'\n');
            }
        }
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logpipe_core::{MemoryTagger, Timestamp};

    fn rec(tag: Tag, data: &str) -> Record {
        let mut r = Record::with_data(tag, Timestamp::new(1_065_910_455, 3_000_000), data.into());
        r.src = "10.0.0.9".parse().unwrap();
        r
    }

    fn tagger_with(name: &str) -> (Arc<MemoryTagger>, Tag) {
        let tagger = Arc::new(MemoryTagger::new());
        let tag = tagger.negotiate(name).unwrap();
        (tagger, tag)
    }

    #[test]
    fn test_raw_with_delimiter() {
        let (tagger, tag) = tagger_with("t");
        let mut enc = Encoder::new(Encoding::Raw, b"\r\n".to_vec(), tagger);
        assert_eq!(enc.encode(&rec(tag, "payload")), b"payload\r\n");
    }

    #[test]
    fn test_json_resolves_tag_name() {
        let (tagger, tag) = tagger_with("weblogs");
        let mut enc = Encoder::new(Encoding::Json, b"\n".to_vec(), tagger);
        let out = enc.encode(&rec(tag, "hi")).to_vec();
        let doc: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(doc["Tag"], "weblogs");
        assert_eq!(doc["SRC"], "10.0.0.9");
        assert_eq!(doc["TS"], "2003-10-11T22:14:15.003000000Z");
        assert_eq!(doc["Data"], B64.encode(b"hi"));
    }

    #[test]
    fn test_syslog_envelope() {
        let (tagger, tag) = tagger_with("sys");
        let mut enc = Encoder::new(Encoding::Syslog, b"\n".to_vec(), tagger);
        let out = enc.encode(&rec(tag, "the body"));
        assert_eq!(
            out,
            b"<134>1 2003-10-11T22:14:15.003000000Z gravwell sys - - - the body\n"
        );
    }

    #[test]
    fn test_unknown_tag_falls_back_to_number() {
        let tagger = Arc::new(MemoryTagger::new());
        let mut enc = Encoder::new(Encoding::Syslog, b"\n".to_vec(), tagger);
        let out = enc.encode(&rec(Tag(42), "x"));
        assert!(std::str::from_utf8(out).unwrap().contains(" 42 - - - "));
    }
}
