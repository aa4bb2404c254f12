//! JSON extractor: rewrites record bodies to a subset of their fields.

use crate::pathspec::{bare_value_bytes, write_json_token, PathSpec};
use logpipe_config::{ConfigError, KvSection};
use logpipe_core::{ProcessError, Processor, Record};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct JsonExtractConfig {
    pub paths: Vec<PathSpec>,
    pub force_json_object: bool,
    /// Drop records that do not yield every configured key.
    pub strict_extraction: bool,
    pub drop_misses: bool,
}

impl JsonExtractConfig {
    pub fn load(sec: &KvSection) -> Result<Self, ConfigError> {
        let mut paths = Vec::new();
        for raw in sec.get_strings("Extractions") {
            for part in raw.split(',') {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                paths.push(
                    PathSpec::parse(part)
                        .map_err(|e| ConfigError::bad_value(sec.name(), "Extractions", e))?,
                );
            }
        }
        if paths.is_empty() {
            return Err(ConfigError::MissingKey {
                section: sec.name().to_string(),
                key: "Extractions".to_string(),
            });
        }

        Ok(Self {
            paths,
            force_json_object: sec.get_bool("Force-JSON-Object", false)?,
            strict_extraction: sec.get_bool("Strict-Extraction", false)?,
            drop_misses: drop_misses_policy(sec)?,
        })
    }
}

/// Resolves the drop policy, honouring the legacy `Passthrough-Misses`
/// spelling when `Drop-Misses` is absent.
pub(crate) fn drop_misses_policy(sec: &KvSection) -> Result<bool, ConfigError> {
    if sec.has("Drop-Misses") {
        return sec.get_bool("Drop-Misses", false);
    }
    if sec.has("Passthrough-Misses") {
        return Ok(!sec.get_bool("Passthrough-Misses", true)?);
    }
    Ok(false)
}

pub struct JsonExtract {
    cfg: JsonExtractConfig,
}

impl JsonExtract {
    pub fn new(cfg: JsonExtractConfig) -> Self {
        Self { cfg }
    }

    pub fn from_section(sec: &KvSection) -> Result<Self, ConfigError> {
        Ok(Self::new(JsonExtractConfig::load(sec)?))
    }

    /// Rewrites one body; `None` signals a miss.
    fn extract(&self, data: &[u8]) -> Option<Vec<u8>> {
        let doc: Value = serde_json::from_slice(data).ok()?;

        if self.cfg.paths.len() == 1 && !self.cfg.force_json_object {
            return self.cfg.paths[0].lookup(&doc).map(bare_value_bytes);
        }

        let mut out = Vec::with_capacity(data.len() / 2);
        out.push(b'{');
        let mut found = 0usize;
        for path in &self.cfg.paths {
            let Some(v) = path.lookup(&doc) else {
                if self.cfg.strict_extraction {
                    return None;
                }
                continue;
            };
            if found > 0 {
                out.push(b',');
            }
            write_json_token(&mut out, &Value::String(path.last().to_string()));
            out.push(b':');
            write_json_token(&mut out, v);
            found += 1;
        }
        out.push(b'}');

        if found == 0 {
            return None;
        }
        Some(out)
    }
}

impl Processor for JsonExtract {
    fn process(&mut self, mut batch: Vec<Record>) -> Result<Vec<Record>, ProcessError> {
        // Strict extraction drops on any miss, independent of Drop-Misses.
        let keep_misses = !self.cfg.drop_misses && !self.cfg.strict_extraction;
        batch.retain_mut(|rec| match self.extract(&rec.data) {
            Some(data) => {
                rec.data = data;
                true
            }
            None => keep_misses,
        });
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logpipe_core::{Tag, Timestamp};

    fn rec(data: &str) -> Record {
        Record::with_data(Tag(0), Timestamp::new(1, 0), data.as_bytes().to_vec())
    }

    fn extractor(paths: &[&str], force: bool, strict: bool, drop: bool) -> JsonExtract {
        JsonExtract::new(JsonExtractConfig {
            paths: paths.iter().map(|p| PathSpec::parse(p).unwrap()).collect(),
            force_json_object: force,
            strict_extraction: strict,
            drop_misses: drop,
        })
    }

    const DOC: &str = r#"{"foo":{"bar":"hi","n":3},"top":true}"#;

    #[test]
    fn test_single_path_emits_bare_value() {
        let mut p = extractor(&["foo.bar"], false, false, false);
        let out = p.process(vec![rec(DOC)]).unwrap();
        assert_eq!(out[0].data, b"hi");
    }

    #[test]
    fn test_single_path_forced_object() {
        let mut p = extractor(&["foo.bar"], true, false, false);
        let out = p.process(vec![rec(DOC)]).unwrap();
        assert_eq!(out[0].data, br#"{"bar":"hi"}"#);
    }

    #[test]
    fn test_multi_path_object_keyed_by_final_segment() {
        let mut p = extractor(&["foo.n", "top"], false, false, false);
        let out = p.process(vec![rec(DOC)]).unwrap();
        assert_eq!(out[0].data, br#"{"n":3,"top":true}"#);
    }

    #[test]
    fn test_strict_drops_partial_yield() {
        let mut p = extractor(&["foo.n", "missing"], false, true, false);
        let out = p.process(vec![rec(DOC)]).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_non_strict_keeps_partial_yield() {
        let mut p = extractor(&["foo.n", "missing"], false, false, false);
        let out = p.process(vec![rec(DOC)]).unwrap();
        assert_eq!(out[0].data, br#"{"n":3}"#);
    }

    #[test]
    fn test_total_miss_policy() {
        let mut keep = extractor(&["nope"], false, false, false);
        let out = keep.process(vec![rec(DOC)]).unwrap();
        assert_eq!(out[0].data.as_slice(), DOC.as_bytes());

        let mut drop = extractor(&["nope"], false, false, true);
        assert!(drop.process(vec![rec(DOC)]).unwrap().is_empty());
    }

    #[test]
    fn test_unparseable_body_is_a_miss() {
        let mut drop = extractor(&["foo"], false, false, true);
        assert!(drop.process(vec![rec("not json")]).unwrap().is_empty());
    }

    #[test]
    fn test_legacy_passthrough_misses_key() {
        let mut sec = KvSection::new("x");
        sec.push_str("type", "jsonextract");
        sec.push_str("Extractions", "foo");
        sec.push_str("Passthrough-Misses", "false");
        let cfg = JsonExtractConfig::load(&sec).unwrap();
        assert!(cfg.drop_misses);
    }
}
