// logpipe-config - the preprocessor configuration schema
//
// The configuration-file parser proper belongs to the host; what this crate
// pins down is the schema the factory consumes: one ordered,
// case-insensitive key/value section per preprocessor with a required
// `type` key, plus the value grammars (booleans, integers, Go-style
// durations, byte sizes). A thin TOML front-end maps
// `[preprocessor.NAME]` tables onto that schema for hosts that want a
// concrete file format.

use std::time::Duration;
use thiserror::Error;

mod section;
mod toml_front;
mod values;

pub use section::{KvSection, KvValue};
pub use toml_front::PipelineConfig;
pub use values::{parse_size, parse_go_duration};

/// Configuration errors; all fatal at construction time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("preprocessor {section:?}: missing required key {key:?}")]
    MissingKey { section: String, key: String },

    #[error("preprocessor {section:?}: bad value for {key:?}: {reason}")]
    BadValue {
        section: String,
        key: String,
        reason: String,
    },

    #[error("unknown preprocessor {kind:?} in {section:?}")]
    UnknownKind { section: String, kind: String },

    #[error("config parse: {0}")]
    Parse(String),

    #[error("config file: {0}")]
    Io(#[from] std::io::Error),

    /// Construction-time failure inside a processor (file load, regex
    /// compile, tag negotiation).
    #[error("preprocessor {section:?}: {reason}")]
    Build { section: String, reason: String },
}

impl ConfigError {
    pub fn bad_value(
        section: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ConfigError::BadValue {
            section: section.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn build(section: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Build {
            section: section.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias used across the loader surface.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Returns a duration config value, `None` when the key is absent.
pub fn duration_of(sec: &KvSection, key: &str) -> Result<Option<Duration>> {
    match sec.get_string(key) {
        None => Ok(None),
        Some(raw) => parse_go_duration(&raw)
            .map(Some)
            .map_err(|e| ConfigError::bad_value(sec.name(), key, e)),
    }
}

/// Returns a byte-size config value, `None` when the key is absent.
pub fn size_of(sec: &KvSection, key: &str) -> Result<Option<u64>> {
    match sec.get_string(key) {
        None => Ok(None),
        Some(raw) => parse_size(&raw)
            .map(Some)
            .map_err(|e| ConfigError::bad_value(sec.name(), key, e)),
    }
}
