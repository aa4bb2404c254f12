//! Out-of-band record forwarding.
//!
//! The forwarder duplicates matching records to another endpoint without
//! removing them from the main pipeline: `process` clones survivors into a
//! bounded queue and returns its input unchanged, while a dedicated worker
//! thread owns the connection, reconnecting on failure. Close drains the
//! queue for a bounded time, then breaks the connection under the worker if
//! it is stuck mid-write.

mod config;
mod conn;
mod encode;
mod forwarder;

pub use config::{Encoding, ForwarderConfig, Protocol};
pub use forwarder::Forwarder;
