//! Regex timestamper: captures a substring and reparses the record time.

use logpipe_config::{ConfigError, KvSection};
use logpipe_core::{parse_with_layout, AutoGrinder, ProcessError, Processor, Record, TimeGrinder};
use regex::bytes::Regex;

const DEFAULT_CAPTURE: &str = "ts";

#[derive(Debug, Clone)]
pub struct RegexTimestampConfig {
    pub regex: String,
    /// Name of the capture holding the timestamp text; defaults to `ts`.
    pub capture_name: String,
    pub format_override: Option<String>,
}

impl RegexTimestampConfig {
    pub fn load(sec: &KvSection) -> Result<Self, ConfigError> {
        Ok(Self {
            regex: sec.require_string("Regex")?,
            capture_name: sec
                .get_string("TS-Capture-Name")
                .unwrap_or_else(|| DEFAULT_CAPTURE.to_string()),
            format_override: sec.get_string("Timestamp-Format-Override"),
        })
    }
}

pub struct RegexTimestamp {
    re: Regex,
    group: usize,
    format_override: Option<String>,
    grinder: Box<dyn TimeGrinder>,
}

impl RegexTimestamp {
    pub fn new(cfg: RegexTimestampConfig) -> Result<Self, ConfigError> {
        Self::build("regextimestamp", cfg)
    }

    pub fn from_section(sec: &KvSection) -> Result<Self, ConfigError> {
        Self::build(sec.name(), RegexTimestampConfig::load(sec)?)
    }

    fn build(section: &str, cfg: RegexTimestampConfig) -> Result<Self, ConfigError> {
        let re = Regex::new(&cfg.regex)
            .map_err(|e| ConfigError::build(section, format!("bad regex: {e}")))?;
        let group = re
            .capture_names()
            .position(|n| n == Some(cfg.capture_name.as_str()))
            .ok_or_else(|| {
                ConfigError::build(
                    section,
                    format!("regex has no capture named {:?}", cfg.capture_name),
                )
            })?;
        Ok(Self {
            re,
            group,
            format_override: cfg.format_override,
            grinder: Box::new(AutoGrinder::new()),
        })
    }
}

impl Processor for RegexTimestamp {
    fn process(&mut self, mut batch: Vec<Record>) -> Result<Vec<Record>, ProcessError> {
        for rec in batch.iter_mut() {
            let ts = self
                .re
                .captures(&rec.data)
                .and_then(|caps| caps.get(self.group).map(|m| m.as_bytes().to_vec()))
                .and_then(|raw| match &self.format_override {
                    Some(layout) => std::str::from_utf8(&raw)
                        .ok()
                        .and_then(|s| parse_with_layout(s, layout)),
                    None => self.grinder.extract(&raw),
                });
            // Failures leave the record untouched.
            if let Some(ts) = ts {
                rec.ts = ts;
            }
        }
        Ok(batch)
    }
}
