//! JSON array splitter: one record in, one record out per array element.

use crate::json_extract::drop_misses_policy;
use crate::pathspec::{bare_value_bytes, write_json_token, PathSpec};
use logpipe_config::{ConfigError, KvSection};
use logpipe_core::{ProcessError, Processor, Record};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct JsonArraySplitConfig {
    pub path: PathSpec,
    pub force_json_object: bool,
    /// Extra top-level fields of the source object copied onto every
    /// emitted object.
    pub additional_fields: Vec<String>,
    pub drop_misses: bool,
}

impl JsonArraySplitConfig {
    pub fn load(sec: &KvSection) -> Result<Self, ConfigError> {
        let raw = sec.require_string("Extraction")?;
        let path = PathSpec::parse(&raw)
            .map_err(|e| ConfigError::bad_value(sec.name(), "Extraction", e))?;

        let mut additional_fields = Vec::new();
        for raw in sec.get_strings("Additional-Fields") {
            for part in raw.split(',') {
                let part = part.trim();
                if !part.is_empty() {
                    additional_fields.push(part.to_string());
                }
            }
        }

        Ok(Self {
            path,
            force_json_object: sec.get_bool("Force-JSON-Object", false)?,
            additional_fields,
            drop_misses: drop_misses_policy(sec)?,
        })
    }
}

pub struct JsonArraySplit {
    cfg: JsonArraySplitConfig,
}

impl JsonArraySplit {
    pub fn new(cfg: JsonArraySplitConfig) -> Self {
        Self { cfg }
    }

    pub fn from_section(sec: &KvSection) -> Result<Self, ConfigError> {
        Ok(Self::new(JsonArraySplitConfig::load(sec)?))
    }

    fn element_body(&self, doc: &Value, elem: &Value) -> Vec<u8> {
        if !self.cfg.force_json_object && self.cfg.additional_fields.is_empty() {
            return bare_value_bytes(elem);
        }
        let mut out = Vec::new();
        out.push(b'{');
        write_json_token(&mut out, &Value::String(self.cfg.path.last().to_string()));
        out.push(b':');
        write_json_token(&mut out, elem);
        for field in &self.cfg.additional_fields {
            let Some(v) = doc.as_object().and_then(|o| o.get(field)) else {
                continue;
            };
            out.push(b',');
            write_json_token(&mut out, &Value::String(field.clone()));
            out.push(b':');
            write_json_token(&mut out, v);
        }
        out.push(b'}');
        out
    }
}

impl Processor for JsonArraySplit {
    fn process(&mut self, batch: Vec<Record>) -> Result<Vec<Record>, ProcessError> {
        let mut out = Vec::with_capacity(batch.len());
        for rec in batch {
            let doc: Option<Value> = serde_json::from_slice(&rec.data).ok();
            let arr = doc
                .as_ref()
                .and_then(|d| self.cfg.path.lookup(d))
                .and_then(Value::as_array);
            match (doc.as_ref(), arr) {
                (Some(doc), Some(arr)) => {
                    // Children inherit tag/src/ts and the EV block; order
                    // matches array index order.
                    for elem in arr {
                        out.push(rec.child_with_data(self.element_body(doc, elem)));
                    }
                }
                _ => {
                    if !self.cfg.drop_misses {
                        out.push(rec);
                    }
                }
            }
        }
        Ok(out)
    }
}
