//! Gzip pass-through decoder.

use crate::buf::{BoundedBuf, DEFAULT_MAX_BUF_MB, DEFAULT_MIN_BUF_MB};
use flate2::read::GzDecoder;
use logpipe_config::{ConfigError, KvSection};
use logpipe_core::{ProcessError, Processor, Record};
use std::io::Read;
use tracing::debug;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone)]
pub struct GzipConfig {
    /// When true, non-gzip records are forwarded unchanged; when false they
    /// are dropped.
    pub passthrough_non_gzip: bool,
    pub max_buf_mb: usize,
    pub min_buf_mb: usize,
}

impl Default for GzipConfig {
    fn default() -> Self {
        Self {
            passthrough_non_gzip: false,
            max_buf_mb: DEFAULT_MAX_BUF_MB,
            min_buf_mb: DEFAULT_MIN_BUF_MB,
        }
    }
}

impl GzipConfig {
    pub fn load(sec: &KvSection) -> Result<Self, ConfigError> {
        Ok(Self {
            passthrough_non_gzip: sec.get_bool("Passthrough-Non-Gzip", false)?,
            max_buf_mb: sec.get_usize("Max-Buff-MB", DEFAULT_MAX_BUF_MB)?,
            min_buf_mb: sec.get_usize("Min-Buff-MB", DEFAULT_MIN_BUF_MB)?,
        })
    }
}

/// Decompresses gzipped record payloads in place. A pooled output buffer is
/// reused across calls and clamped per the `Max-Buff-MB`/`Min-Buff-MB`
/// bounds.
pub struct GzipDecompressor {
    passthrough: bool,
    buf: BoundedBuf,
}

impl GzipDecompressor {
    pub fn new(cfg: GzipConfig) -> Self {
        Self {
            passthrough: cfg.passthrough_non_gzip,
            buf: BoundedBuf::new(cfg.max_buf_mb, cfg.min_buf_mb),
        }
    }

    pub fn from_section(sec: &KvSection) -> Result<Self, ConfigError> {
        Ok(Self::new(GzipConfig::load(sec)?))
    }
}

impl Processor for GzipDecompressor {
    fn process(&mut self, mut batch: Vec<Record>) -> Result<Vec<Record>, ProcessError> {
        let passthrough = self.passthrough;
        let buf = &mut self.buf;
        batch.retain_mut(|rec| {
            if !rec.data.starts_with(&GZIP_MAGIC) {
                if !passthrough {
                    debug!("dropping non-gzip record");
                }
                return passthrough;
            }
            let scratch = buf.scratch();
            let mut dec = GzDecoder::new(rec.data.as_slice());
            match dec.read_to_end(scratch) {
                Ok(_) => {
                    rec.data = scratch.clone();
                    true
                }
                Err(e) => {
                    // Truncation or a bad CRC; the record is unusable.
                    debug!(error = %e, "dropping undecodable gzip record");
                    false
                }
            }
        });
        self.buf.clamp();
        Ok(batch)
    }
}
