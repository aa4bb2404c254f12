//! The persistent-buffer processor: write-behind durability for batches.

use crate::ring::Ring;
use crate::BufferError;
use logpipe_config::{size_of, ConfigError, KvSection};
use logpipe_core::{ProcessError, Processor, Record};
use std::path::{Path, PathBuf};

const DEFAULT_BUFFER_SIZE: u64 = 2 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct PersistentBufferConfig {
    pub filename: PathBuf,
    /// Lower bound on ring capacity, e.g. `2MB`.
    pub buffer_size: u64,
}

impl PersistentBufferConfig {
    pub fn load(sec: &KvSection) -> Result<Self, ConfigError> {
        Ok(Self {
            filename: PathBuf::from(sec.require_string("Filename")?),
            buffer_size: size_of(sec, "BufferSize")?.unwrap_or(DEFAULT_BUFFER_SIZE),
        })
    }
}

/// Appends every batch to an on-disk ring and passes it through unchanged.
/// The batch is the unit of durability: one frame per `process` call.
pub struct PersistentBuffer {
    ring: Ring,
}

impl PersistentBuffer {
    pub fn new(cfg: PersistentBufferConfig) -> Result<Self, BufferError> {
        Ok(Self {
            ring: Ring::open(&cfg.filename, cfg.buffer_size)?,
        })
    }

    pub fn from_section(sec: &KvSection) -> Result<Self, ConfigError> {
        let cfg = PersistentBufferConfig::load(sec)?;
        Self::new(cfg).map_err(|e| ConfigError::build(sec.name(), e.to_string()))
    }

    /// Opens an existing ring for out-of-band drain (the reader tool path).
    pub fn open(path: &Path) -> Result<Self, BufferError> {
        Ok(Self {
            ring: Ring::open(path, DEFAULT_BUFFER_SIZE)?,
        })
    }

    /// Removes and returns the oldest stored batch;
    /// [`crate::RingError::Empty`] when drained.
    pub fn pop(&mut self) -> Result<Vec<Record>, BufferError> {
        let frame = self.ring.pop()?;
        decode_batch(&frame)
    }

    pub fn stored_batches(&self) -> u64 {
        self.ring.len()
    }
}

fn encode_batch(batch: &[Record]) -> Result<Vec<u8>, BufferError> {
    let encoded = bincode::serialize(batch).map_err(|e| BufferError::Encode(e.to_string()))?;
    Ok(snap::raw::Encoder::new()
        .compress_vec(&encoded)
        .map_err(|e| BufferError::Encode(e.to_string()))?)
}

fn decode_batch(frame: &[u8]) -> Result<Vec<Record>, BufferError> {
    let decoded = snap::raw::Decoder::new()
        .decompress_vec(frame)
        .map_err(|e| BufferError::Decode(e.to_string()))?;
    bincode::deserialize(&decoded).map_err(|e| BufferError::Decode(e.to_string()))
}

impl Processor for PersistentBuffer {
    fn process(&mut self, batch: Vec<Record>) -> Result<Vec<Record>, ProcessError> {
        if batch.is_empty() {
            return Ok(batch);
        }
        let frame = encode_batch(&batch).map_err(|e| ProcessError::other(e.to_string()))?;
        self.ring
            .append(&frame)
            .map_err(|e| ProcessError::other(e.to_string()))?;
        Ok(batch)
    }

    fn flush(&mut self) -> Vec<Record> {
        // Durability point, not a record source.
        if let Err(e) = self.ring.sync() {
            tracing::warn!(error = %e, "ring fsync failed");
        }
        Vec::new()
    }

    fn close(&mut self) -> Result<(), ProcessError> {
        self.ring
            .sync()
            .map_err(|e| ProcessError::other(e.to_string()))
    }
}
