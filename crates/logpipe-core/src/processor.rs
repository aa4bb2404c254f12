//! The processor contract and the terminal writer interface.

use crate::entry::Record;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors crossing the processor boundary.
///
/// Per-record problems (parse misses, extraction misses) never surface here;
/// stages resolve those internally via their drop/pass policy. What does
/// surface is either a recoverable plugin-style fault, which the set absorbs,
/// or a hard error that aborts the chain.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Recoverable fault from a plugin-style stage. Carries the pre-call
    /// batch; the set logs the fault and continues with that batch.
    #[error("recoverable processor fault: {reason}")]
    Fault { reason: String, batch: Vec<Record> },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Accumulated errors from a set close; every flush/close step ran.
    #[error("close failed: {}", .0.join("; "))]
    Close(Vec<String>),

    #[error("{0}")]
    Other(String),
}

impl ProcessError {
    pub fn other(msg: impl Into<String>) -> Self {
        ProcessError::Other(msg.into())
    }
}

/// A unit of the preprocessor chain: maps one batch of records to another
/// and may hold state between calls.
///
/// Stages that own no resources and hold no flushable state just take the
/// default `flush`/`close`.
pub trait Processor: Send {
    /// Maps one batch to another. Returning an empty batch means
    /// "dropped all". Implementations may mutate records in place and
    /// return the input vector grown or shrunk.
    fn process(&mut self, batch: Vec<Record>) -> Result<Vec<Record>, ProcessError>;

    /// Called exactly once during shutdown, before `close`. Returns records
    /// emitted because of final state (e.g. unassembled multipart
    /// sequences).
    fn flush(&mut self) -> Vec<Record> {
        Vec::new()
    }

    /// Called exactly once after `flush`; releases transport and file
    /// handles.
    fn close(&mut self) -> Result<(), ProcessError> {
        Ok(())
    }
}

impl std::fmt::Debug for dyn Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<dyn Processor>")
    }
}

/// Cancellation handle threaded through the batch-context entry points.
///
/// Processors do not poll it; it travels only as far as the terminal writer.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Terminal writer that persists whatever survives the chain.
pub trait EntryWriter: Send {
    fn write_batch(&mut self, batch: Vec<Record>) -> Result<(), ProcessError>;

    /// Context-aware variant; the default ignores the token.
    fn write_batch_ctx(
        &mut self,
        batch: Vec<Record>,
        ctx: &CancelToken,
    ) -> Result<(), ProcessError> {
        let _ = ctx;
        self.write_batch(batch)
    }
}

/// Collecting writer for hosts and tests. Clones share the same backing
/// store, so a caller can hand one clone to a set and inspect the other.
#[derive(Clone, Default)]
pub struct MemoryWriter {
    batches: Arc<Mutex<Vec<Vec<Record>>>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All batches written so far, in order.
    pub fn batches(&self) -> Vec<Vec<Record>> {
        self.batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// All records written so far, flattened in order.
    pub fn records(&self) -> Vec<Record> {
        self.batches().into_iter().flatten().collect()
    }
}

impl EntryWriter for MemoryWriter {
    fn write_batch(&mut self, batch: Vec<Record>) -> Result<(), ProcessError> {
        self.batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(batch);
        Ok(())
    }
}
