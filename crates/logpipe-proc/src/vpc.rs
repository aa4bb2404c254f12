//! CloudWatch/VPC envelope unwinder: one batched JSON envelope in, many
//! records out.

use crate::buf::{BoundedBuf, DEFAULT_MAX_BUF_MB, DEFAULT_MIN_BUF_MB};
use flate2::read::GzDecoder;
use logpipe_config::{ConfigError, KvSection};
use logpipe_core::{ProcessError, Processor, Record, Timestamp};
use serde::Deserialize;
use serde_json::Value;
use std::io::Read;
use tracing::debug;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone)]
pub struct VpcConfig {
    /// Emit the `extractedFields` object instead of the raw `message`.
    pub extract_json: bool,
    pub max_buf_mb: usize,
    pub min_buf_mb: usize,
}

impl Default for VpcConfig {
    fn default() -> Self {
        Self {
            extract_json: false,
            max_buf_mb: DEFAULT_MAX_BUF_MB,
            min_buf_mb: DEFAULT_MIN_BUF_MB,
        }
    }
}

impl VpcConfig {
    pub fn load(sec: &KvSection) -> Result<Self, ConfigError> {
        Ok(Self {
            extract_json: sec.get_bool("Extract-JSON", false)?,
            max_buf_mb: sec.get_usize("Max-Buff-MB", DEFAULT_MAX_BUF_MB)?,
            min_buf_mb: sec.get_usize("Min-Buff-MB", DEFAULT_MIN_BUF_MB)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "logEvents")]
    log_events: Vec<LogEvent>,
}

#[derive(Debug, Deserialize)]
struct LogEvent {
    #[serde(default)]
    message: Option<String>,
    #[serde(rename = "extractedFields", default)]
    extracted_fields: Option<serde_json::Map<String, Value>>,
}

pub struct VpcUnwinder {
    extract_json: bool,
    buf: BoundedBuf,
}

impl VpcUnwinder {
    pub fn new(cfg: VpcConfig) -> Self {
        Self {
            extract_json: cfg.extract_json,
            buf: BoundedBuf::new(cfg.max_buf_mb, cfg.min_buf_mb),
        }
    }

    pub fn from_section(sec: &KvSection) -> Result<Self, ConfigError> {
        Ok(Self::new(VpcConfig::load(sec)?))
    }

    fn parse_envelope(&mut self, data: &[u8]) -> Option<Envelope> {
        if data.starts_with(&GZIP_MAGIC) {
            let scratch = self.buf.scratch();
            let mut dec = GzDecoder::new(data);
            if let Err(e) = dec.read_to_end(scratch) {
                debug!(error = %e, "undecodable gzip envelope");
                return None;
            }
            serde_json::from_slice(scratch).ok()
        } else {
            serde_json::from_slice(data).ok()
        }
    }

    /// Builds the child record for one event; `None` aborts that element.
    fn unwind_event(&self, parent: &Record, event: &LogEvent) -> Option<Record> {
        // The timestamp always comes from extractedFields.start, decimal
        // unix seconds.
        let start = event.extracted_fields.as_ref()?.get("start")?;
        let sec: i64 = match start {
            Value::String(s) => s.trim().parse().ok()?,
            Value::Number(n) => n.as_i64()?,
            _ => return None,
        };

        let data = if self.extract_json {
            serde_json::to_vec(event.extracted_fields.as_ref()?).ok()?
        } else {
            event.message.as_ref()?.as_bytes().to_vec()
        };

        let mut child = parent.child_with_data(data);
        child.ts = Timestamp::new(sec, 0);
        Some(child)
    }
}

impl Processor for VpcUnwinder {
    fn process(&mut self, batch: Vec<Record>) -> Result<Vec<Record>, ProcessError> {
        let mut out = Vec::with_capacity(batch.len());
        for rec in batch {
            match self.parse_envelope(&rec.data) {
                Some(env) => {
                    for event in &env.log_events {
                        if let Some(child) = self.unwind_event(&rec, event) {
                            out.push(child);
                        }
                    }
                }
                // Not an envelope; leave it alone.
                None => out.push(rec),
            }
        }
        self.buf.clamp();
        Ok(out)
    }
}
