//! Core data model and processor contract for the logpipe preprocessor chain.
//!
//! Everything the member crates share lives here: the [`Record`] model, the
//! [`Tagger`] and [`EntryWriter`] collaborator interfaces, the [`Processor`]
//! contract with its recoverable-fault error type, the [`ProcessorSet`]
//! composition driver, the `${name}` template formatter, and the timestamp
//! grinder interface.

mod entry;
mod format;
mod pool;
mod processor;
mod set;
mod tagger;
mod timegrind;

pub use entry::{EnumeratedValue, EvValue, Record, Tag, Timestamp};
pub use format::{FormatError, Formatter, NamedFields};
pub use pool::RecordPool;
pub use processor::{CancelToken, EntryWriter, MemoryWriter, ProcessError, Processor};
pub use set::ProcessorSet;
pub use tagger::{sanitize_tag_name, valid_tag_name, MemoryTagger, TagError, Tagger};
pub use timegrind::{parse_with_layout, AutoGrinder, TimeGrinder};
