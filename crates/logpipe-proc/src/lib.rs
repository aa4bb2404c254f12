//! The stock processor family: decompression, JSON and regex reshaping,
//! content-based routing, envelope unwinding, and the trivial sinks.
//!
//! Every processor here follows the same shape: a `Config` that loads and
//! validates its `KvSection` (compiling regexes, reading referenced files,
//! pre-negotiating tags), and a struct implementing
//! [`logpipe_core::Processor`].

mod buf;
mod corelight;
mod drop;
mod gzip;
mod json_array_split;
mod json_extract;
mod json_filter;
mod json_time_extract;
mod pathspec;
mod plugin;
mod prefix_tree;
mod regex_extract;
mod regex_timestamp;
mod route;
mod router_csv;
mod router_regex;
mod router_src;
mod router_syslog;
mod router_tag;
pub mod syslog;
mod vpc;

pub use buf::BoundedBuf;
pub use corelight::{Corelight, CorelightConfig};
pub use drop::DropAll;
pub use gzip::{GzipConfig, GzipDecompressor};
pub use json_array_split::{JsonArraySplit, JsonArraySplitConfig};
pub use json_extract::{JsonExtract, JsonExtractConfig};
pub use json_filter::{JsonFilter, JsonFilterConfig, MatchAction, MatchLogic};
pub use json_time_extract::{JsonTimeExtract, JsonTimeExtractConfig};
pub use pathspec::PathSpec;
pub use plugin::{PluginProcessor, PluginProgram, PluginRegistry};
pub use prefix_tree::PrefixTree;
pub use regex_extract::{RegexExtract, RegexExtractConfig};
pub use regex_timestamp::{RegexTimestamp, RegexTimestampConfig};
pub use route::RouteTarget;
pub use router_csv::{CsvRouter, CsvRouterConfig};
pub use router_regex::{RegexRouter, RegexRouterConfig};
pub use router_src::{SrcRouter, SrcRouterConfig};
pub use router_syslog::{SyslogRouter, SyslogRouterConfig};
pub use router_tag::{TagRouter, TagRouterConfig};
pub use vpc::{VpcUnwinder, VpcConfig};
