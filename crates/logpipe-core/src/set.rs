//! ProcessorSet: ordered stage composition with flush/close discipline.

use crate::entry::Record;
use crate::processor::{CancelToken, EntryWriter, ProcessError, Processor};
use std::sync::Mutex;
use tracing::{debug, warn};

struct SetInner {
    stages: Vec<Box<dyn Processor>>,
    writer: Option<Box<dyn EntryWriter>>,
}

/// An ordered list of processors plus the terminal writer.
///
/// A set is single-threaded cooperative: one mutex serialises `process`,
/// `process_batch`, and `close`. Multiple sets may run in parallel against
/// the same tagger and writer backend.
pub struct ProcessorSet {
    inner: Mutex<SetInner>,
}

impl ProcessorSet {
    pub fn new(stages: Vec<Box<dyn Processor>>, writer: Box<dyn EntryWriter>) -> Self {
        Self {
            inner: Mutex::new(SetInner {
                stages,
                writer: Some(writer),
            }),
        }
    }

    /// A set with no stages and no writer; `enabled` reports false and the
    /// process entry points write nothing.
    pub fn disabled() -> Self {
        Self {
            inner: Mutex::new(SetInner {
                stages: Vec::new(),
                writer: None,
            }),
        }
    }

    /// True when at least one stage is configured and a writer is present.
    /// Callers short-circuit around the set entirely when this is false.
    pub fn enabled(&self) -> bool {
        let inner = self.lock();
        !inner.stages.is_empty() && inner.writer.is_some()
    }

    /// Threads a single record through the chain and writes survivors.
    /// Returns the number of records written.
    pub fn process(&self, rec: Record) -> Result<usize, ProcessError> {
        self.process_batch(vec![rec])
    }

    /// Threads a batch through every stage in definition order and writes
    /// survivors. Returns the number of records written.
    pub fn process_batch(&self, batch: Vec<Record>) -> Result<usize, ProcessError> {
        self.run(batch, None)
    }

    /// Batch variant propagating a cancellation token to the writer only.
    pub fn process_batch_ctx(
        &self,
        batch: Vec<Record>,
        ctx: &CancelToken,
    ) -> Result<usize, ProcessError> {
        self.run(batch, Some(ctx))
    }

    fn run(&self, batch: Vec<Record>, ctx: Option<&CancelToken>) -> Result<usize, ProcessError> {
        let mut inner = self.lock();
        let SetInner { stages, writer } = &mut *inner;
        let out = run_stages(stages, batch)?;
        let written = out.len();
        if written > 0 {
            if let Some(writer) = writer.as_mut() {
                match ctx {
                    Some(ctx) => writer.write_batch_ctx(out, ctx)?,
                    None => writer.write_batch(out)?,
                }
            }
        }
        Ok(written)
    }

    /// Shuts the chain down. For each stage in order: drain its `flush`,
    /// thread the flushed records through the downstream-only stages, write
    /// survivors, then `close` the stage. Every step runs even after
    /// failures; errors accumulate into one [`ProcessError::Close`].
    pub fn close(&self) -> Result<(), ProcessError> {
        let mut inner = self.lock();
        let SetInner { stages, writer } = &mut *inner;
        let mut errs = Vec::new();

        for i in 0..stages.len() {
            let flushed = stages[i].flush();
            if !flushed.is_empty() {
                debug!(stage = i, records = flushed.len(), "flushed records at close");
                let (_, downstream) = stages.split_at_mut(i + 1);
                match run_stages(downstream, flushed) {
                    Ok(out) if !out.is_empty() => {
                        if let Some(writer) = writer.as_mut() {
                            if let Err(e) = writer.write_batch(out) {
                                errs.push(e.to_string());
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => errs.push(e.to_string()),
                }
            }
            if let Err(e) = stages[i].close() {
                errs.push(e.to_string());
            }
        }

        if errs.is_empty() {
            Ok(())
        } else {
            Err(ProcessError::Close(errs))
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SetInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Runs a batch through consecutive stages. A recoverable fault reverts to
/// the batch carried inside the fault and continues; any other error aborts.
fn run_stages(
    stages: &mut [Box<dyn Processor>],
    mut batch: Vec<Record>,
) -> Result<Vec<Record>, ProcessError> {
    for stage in stages.iter_mut() {
        match stage.process(batch) {
            Ok(out) => batch = out,
            Err(ProcessError::Fault { reason, batch: orig }) => {
                warn!(%reason, "recoverable processor fault, continuing with original batch");
                batch = orig;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Tag, Timestamp};
    use crate::processor::MemoryWriter;

    fn rec(data: &str) -> Record {
        Record::with_data(Tag(0), Timestamp::new(100, 0), data.as_bytes().to_vec())
    }

    /// Appends a suffix to every record; flushes one marker record.
    struct Suffixer {
        suffix: &'static [u8],
        closed: bool,
    }

    impl Suffixer {
        fn new(suffix: &'static [u8]) -> Self {
            Self {
                suffix,
                closed: false,
            }
        }
    }

    impl Processor for Suffixer {
        fn process(&mut self, mut batch: Vec<Record>) -> Result<Vec<Record>, ProcessError> {
            for r in batch.iter_mut() {
                r.data.extend_from_slice(self.suffix);
            }
            Ok(batch)
        }

        fn flush(&mut self) -> Vec<Record> {
            vec![rec("flush")]
        }

        fn close(&mut self) -> Result<(), ProcessError> {
            self.closed = true;
            Ok(())
        }
    }

    struct Faulty;

    impl Processor for Faulty {
        fn process(&mut self, batch: Vec<Record>) -> Result<Vec<Record>, ProcessError> {
            Err(ProcessError::Fault {
                reason: "plugin crashed".into(),
                batch,
            })
        }
    }

    struct DropAll;

    impl Processor for DropAll {
        fn process(&mut self, _batch: Vec<Record>) -> Result<Vec<Record>, ProcessError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_stages_run_in_definition_order() {
        let writer = MemoryWriter::new();
        let set = ProcessorSet::new(
            vec![
                Box::new(Suffixer::new(b"-a")),
                Box::new(Suffixer::new(b"-b")),
            ],
            Box::new(writer.clone()),
        );

        let written = set.process(rec("x")).unwrap();
        assert_eq!(written, 1);
        assert_eq!(writer.records()[0].data, b"x-a-b");
    }

    #[test]
    fn test_fault_reverts_to_original_batch() {
        let writer = MemoryWriter::new();
        let set = ProcessorSet::new(
            vec![Box::new(Faulty), Box::new(Suffixer::new(b"-ok"))],
            Box::new(writer.clone()),
        );

        set.process(rec("in")).unwrap();
        assert_eq!(writer.records()[0].data, b"in-ok");
    }

    #[test]
    fn test_drop_all_writes_nothing() {
        let writer = MemoryWriter::new();
        let set = ProcessorSet::new(vec![Box::new(DropAll)], Box::new(writer.clone()));
        assert_eq!(set.process(rec("gone")).unwrap(), 0);
        assert!(writer.records().is_empty());
    }

    #[test]
    fn test_close_threads_flush_through_downstream_only() {
        let writer = MemoryWriter::new();
        let set = ProcessorSet::new(
            vec![
                Box::new(Suffixer::new(b"-1")),
                Box::new(Suffixer::new(b"-2")),
            ],
            Box::new(writer.clone()),
        );
        set.close().unwrap();

        // Stage 1's flush passes through stage 2 only; stage 2's flush
        // passes through nothing.
        let written: Vec<Vec<u8>> = writer.records().into_iter().map(|r| r.data).collect();
        assert_eq!(written, vec![b"flush-2".to_vec(), b"flush".to_vec()]);
    }

    #[test]
    fn test_enabled_predicate() {
        let set = ProcessorSet::disabled();
        assert!(!set.enabled());

        let set = ProcessorSet::new(
            vec![Box::new(DropAll)],
            Box::new(MemoryWriter::new()),
        );
        assert!(set.enabled());
    }

    #[test]
    fn test_order_preserved_through_chain() {
        let writer = MemoryWriter::new();
        let set = ProcessorSet::new(
            vec![Box::new(Suffixer::new(b""))],
            Box::new(writer.clone()),
        );
        let batch: Vec<Record> = (0..16).map(|i| rec(&format!("r{i}"))).collect();
        set.process_batch(batch.clone()).unwrap();
        assert_eq!(writer.records(), batch);
    }
}
