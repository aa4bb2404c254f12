//! Durable entry buffering: a fixed-size on-disk ring of record batches.
//!
//! Each incoming batch is bincode-encoded, snappy-compressed, and appended
//! as one framed record. When the ring fills, the oldest frames are
//! reclaimed, so capacity is a lower bound on history, not a back-pressure
//! mechanism. An independent pop operation restores batches oldest-first
//! for out-of-band drain tools.

mod processor;
mod ring;

pub use processor::{PersistentBuffer, PersistentBufferConfig};
pub use ring::{Ring, RingError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BufferError {
    #[error(transparent)]
    Ring(#[from] RingError),

    #[error("batch encode: {0}")]
    Encode(String),

    #[error("batch decode: {0}")]
    Decode(String),
}
