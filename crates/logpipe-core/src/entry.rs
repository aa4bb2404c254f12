//! The record model: one log event plus its out-of-band attributes.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

/// Opaque numeric stream identifier negotiated from the [`Tagger`].
///
/// 16 bits fits the existing wire format; nothing in the pipeline assigns
/// meaning to the value itself.
///
/// [`Tagger`]: crate::Tagger
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Tag(pub u16);

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whole-second plus nanosecond timestamp pair.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Timestamp {
    pub sec: i64,
    pub nsec: u32,
}

impl Timestamp {
    pub fn new(sec: i64, nsec: u32) -> Self {
        Self { sec, nsec }
    }

    pub fn now() -> Self {
        Self::from_datetime(&Utc::now())
    }

    pub fn from_datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self {
        Self {
            sec: dt.timestamp(),
            nsec: dt.timestamp_subsec_nanos(),
        }
    }

    /// Converts back to chrono; `None` for out-of-range values.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.sec, self.nsec).single()
    }

    /// RFC3339 with nanosecond precision, the forwarder syslog envelope form.
    pub fn rfc3339_nano(&self) -> String {
        match self.to_datetime() {
            Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Nanos, true),
            None => String::from("1970-01-01T00:00:00.000000000Z"),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.sec == 0 && self.nsec == 0
    }
}

/// Typed value carried out-of-band on a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EvValue {
    String(String),
    Uint(u64),
    Int(i64),
    Float(f64),
    Bytes(Vec<u8>),
    Bool(bool),
    Ip(IpAddr),
    Time(Timestamp),
    Null,
}

/// A named, typed side-channel attribute.
///
/// The enumerated-value block on a record preserves insertion order and
/// permits duplicate names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumeratedValue {
    pub name: String,
    pub value: EvValue,
}

impl EnumeratedValue {
    pub fn new(name: impl Into<String>, value: EvValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, EvValue::String(value.into()))
    }
}

/// One log event flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub tag: Tag,
    pub src: IpAddr,
    pub ts: Timestamp,
    pub data: Vec<u8>,
    pub evs: Vec<EnumeratedValue>,
}

impl Record {
    pub fn new(tag: Tag, src: IpAddr, ts: Timestamp, data: Vec<u8>) -> Self {
        Self {
            tag,
            src,
            ts,
            data,
            evs: Vec::new(),
        }
    }

    /// A record with an unspecified source, for inputs that carry none.
    pub fn with_data(tag: Tag, ts: Timestamp, data: Vec<u8>) -> Self {
        Self::new(tag, IpAddr::V4(Ipv4Addr::UNSPECIFIED), ts, data)
    }

    pub fn add_ev(&mut self, ev: EnumeratedValue) {
        self.evs.push(ev);
    }

    /// Derives a new record carrying this record's tag, source, timestamp,
    /// and a copy of its enumerated-value block.
    ///
    /// Every stage that emits new records derived from an input goes through
    /// here so the upstream block survives as a prefix downstream.
    pub fn child_with_data(&self, data: Vec<u8>) -> Record {
        Record {
            tag: self.tag,
            src: self.src,
            ts: self.ts,
            data,
            evs: self.evs.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_rfc3339_nano() {
        let ts = Timestamp::new(1_065_910_455, 3_000_000);
        assert_eq!(ts.rfc3339_nano(), "2003-10-11T22:14:15.003000000Z");
    }

    #[test]
    fn test_timestamp_datetime_roundtrip() {
        let ts = Timestamp::new(1_700_000_123, 456_789);
        let dt = ts.to_datetime().unwrap();
        assert_eq!(Timestamp::from_datetime(&dt), ts);
    }

    #[test]
    fn test_child_inherits_evs_as_prefix() {
        let mut rec = Record::with_data(Tag(7), Timestamp::new(10, 0), b"parent".to_vec());
        rec.add_ev(EnumeratedValue::string("color", "red"));
        rec.add_ev(EnumeratedValue::new("count", EvValue::Uint(3)));

        let mut child = rec.child_with_data(b"child".to_vec());
        child.add_ev(EnumeratedValue::string("extra", "x"));

        assert_eq!(child.tag, rec.tag);
        assert_eq!(child.ts, rec.ts);
        assert_eq!(child.data, b"child");
        assert_eq!(child.evs[..2], rec.evs[..]);
        assert_eq!(child.evs.len(), 3);
    }

    #[test]
    fn test_evs_allow_duplicate_names() {
        let mut rec = Record::with_data(Tag(0), Timestamp::default(), Vec::new());
        rec.add_ev(EnumeratedValue::string("k", "a"));
        rec.add_ev(EnumeratedValue::string("k", "b"));
        assert_eq!(rec.evs.len(), 2);
    }
}
