//! logpipe - the preprocessor core of a log-ingest pipeline.
//!
//! A [`ProcessorSet`] threads batches of [`Record`]s through an ordered
//! chain of processors and hands survivors to an [`EntryWriter`]. The
//! processors themselves live in the member crates; this crate ties them to
//! the configuration schema through [`build_processor`]/[`build_set`].

mod factory;

pub use factory::{build_processor, build_set};

pub use logpipe_core::{
    CancelToken, EnumeratedValue, EntryWriter, EvValue, Formatter, MemoryTagger, MemoryWriter,
    ProcessError, Processor, ProcessorSet, Record, RecordPool, Tag, TagError, Tagger, TimeGrinder,
    Timestamp,
};

pub use logpipe_buffer::PersistentBuffer;
pub use logpipe_config::{ConfigError, KvSection, KvValue, PipelineConfig};
pub use logpipe_forward::Forwarder;
pub use logpipe_ise::CiscoIse;
pub use logpipe_proc::{PluginProgram, PluginRegistry};
