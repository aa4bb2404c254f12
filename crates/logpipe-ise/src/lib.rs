//! Cisco ISE preprocessing: multipart syslog reassembly and re-emission.
//!
//! Remote ISE nodes fragment long messages across syslog lines; each line
//! carries a `(host, category, messageId)` key plus `total`/`seq` counters.
//! The [`Reassembler`] joins fragments, evicting half-finished sequences on
//! latency or memory pressure, and the [`CiscoIse`] processor re-emits the
//! merged message as raw text, CEF, or JSON.

mod message;
mod parser;
mod processor;
mod reassembler;

pub use message::{parse_message, AttributeOptions, IseMessage, OutputFormat};
pub use parser::{parse_header, Fragment, HeaderError};
pub use processor::{CiscoIse, CiscoIseConfig};
pub use reassembler::{AddOutcome, Ejected, Reassembler};
