//! Corelight/Zeek re-tagger: routes JSON records by their `_path` field.

use logpipe_config::{ConfigError, KvSection};
use logpipe_core::{sanitize_tag_name, ProcessError, Processor, Record, Tag, Tagger};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_PREFIX: &str = "zeek";

#[derive(Debug, Clone)]
pub struct CorelightConfig {
    /// Prepended to `_path` when forming the tag name.
    pub prefix: String,
    /// `path:tag` overrides taking precedence over prefix concatenation.
    pub custom_paths: Vec<String>,
    pub drop_misses: bool,
}

impl CorelightConfig {
    pub fn load(sec: &KvSection) -> Result<Self, ConfigError> {
        Ok(Self {
            prefix: sec
                .get_string("Prefix")
                .unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            custom_paths: sec.get_strings("Custom-Path"),
            drop_misses: sec.get_bool("Drop-Misses", false)?,
        })
    }
}

pub struct Corelight {
    prefix: String,
    overrides: HashMap<String, Tag>,
    tagger: Arc<dyn Tagger>,
    cache: HashMap<String, Tag>,
    drop_misses: bool,
}

impl Corelight {
    pub fn from_section(sec: &KvSection, tagger: Arc<dyn Tagger>) -> Result<Self, ConfigError> {
        let cfg = CorelightConfig::load(sec)?;

        let mut overrides = HashMap::new();
        for raw in &cfg.custom_paths {
            let (path, tag) = raw.split_once(':').ok_or_else(|| {
                ConfigError::bad_value(
                    sec.name(),
                    "Custom-Path",
                    format!("expected path:tag, got {raw:?}"),
                )
            })?;
            let tag = tagger
                .negotiate(tag.trim())
                .map_err(|e| ConfigError::build(sec.name(), e.to_string()))?;
            overrides.insert(path.trim().to_string(), tag);
        }

        Ok(Self {
            prefix: cfg.prefix,
            overrides,
            tagger,
            cache: HashMap::new(),
            drop_misses: cfg.drop_misses,
        })
    }

    fn tag_for_path(&mut self, path: &str) -> Option<Tag> {
        if let Some(tag) = self.overrides.get(path) {
            return Some(*tag);
        }
        if let Some(tag) = self.cache.get(path) {
            return Some(*tag);
        }
        let name = sanitize_tag_name(&format!("{}{}", self.prefix, path));
        match self.tagger.negotiate(&name) {
            Ok(tag) => {
                self.cache.insert(path.to_string(), tag);
                Some(tag)
            }
            Err(e) => {
                debug!(path, error = %e, "tag negotiation failed");
                None
            }
        }
    }
}

impl Processor for Corelight {
    fn process(&mut self, mut batch: Vec<Record>) -> Result<Vec<Record>, ProcessError> {
        let drop_misses = self.drop_misses;
        let mut keep = Vec::with_capacity(batch.len());
        for mut rec in batch.drain(..) {
            let path = serde_json::from_slice::<Value>(&rec.data)
                .ok()
                .and_then(|doc| {
                    doc.get("_path")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                });
            match path.and_then(|p| self.tag_for_path(&p)) {
                Some(tag) => {
                    rec.tag = tag;
                    keep.push(rec);
                }
                None => {
                    if !drop_misses {
                        keep.push(rec);
                    }
                }
            }
        }
        Ok(keep)
    }
}
