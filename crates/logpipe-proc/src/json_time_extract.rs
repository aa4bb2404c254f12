//! JSON time extractor: repoints the record timestamp at a field value.

use crate::pathspec::{value_key_string, PathSpec};
use logpipe_config::{ConfigError, KvSection};
use logpipe_core::{parse_with_layout, AutoGrinder, ProcessError, Processor, Record, TimeGrinder};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct JsonTimeExtractConfig {
    pub path: PathSpec,
    /// Explicit chrono layout; when absent the time grinder heuristic runs.
    pub format_override: Option<String>,
}

impl JsonTimeExtractConfig {
    pub fn load(sec: &KvSection) -> Result<Self, ConfigError> {
        let raw = sec.require_string("Path")?;
        let path =
            PathSpec::parse(&raw).map_err(|e| ConfigError::bad_value(sec.name(), "Path", e))?;
        Ok(Self {
            path,
            format_override: sec.get_string("Timestamp-Format-Override"),
        })
    }
}

pub struct JsonTimeExtract {
    cfg: JsonTimeExtractConfig,
    grinder: Box<dyn TimeGrinder>,
}

impl JsonTimeExtract {
    pub fn new(cfg: JsonTimeExtractConfig) -> Self {
        Self::with_grinder(cfg, Box::new(AutoGrinder::new()))
    }

    pub fn with_grinder(cfg: JsonTimeExtractConfig, grinder: Box<dyn TimeGrinder>) -> Self {
        Self { cfg, grinder }
    }

    pub fn from_section(sec: &KvSection) -> Result<Self, ConfigError> {
        Ok(Self::new(JsonTimeExtractConfig::load(sec)?))
    }
}

impl Processor for JsonTimeExtract {
    fn process(&mut self, mut batch: Vec<Record>) -> Result<Vec<Record>, ProcessError> {
        for rec in batch.iter_mut() {
            let Ok(doc) = serde_json::from_slice::<Value>(&rec.data) else {
                continue;
            };
            let Some(v) = self.cfg.path.lookup(&doc) else {
                continue;
            };
            let text = value_key_string(v);
            let ts = match &self.cfg.format_override {
                Some(layout) => parse_with_layout(&text, layout),
                None => self.grinder.extract(text.as_bytes()),
            };
            // Misses leave the timestamp untouched.
            if let Some(ts) = ts {
                rec.ts = ts;
            }
        }
        Ok(batch)
    }
}
