//! JSON membership filter: pass or drop records by set membership of
//! extracted fields.
//!
//! Each configured field names a dotted path and a file of values. The
//! values are held as 128-bit keyed hashes rather than strings; the key is
//! random per process run, so the sets are useless to an attacker who can
//! read process memory but cannot observe the seed.

use crate::pathspec::{value_key_string, PathSpec};
use logpipe_config::{ConfigError, KvSection};
use logpipe_core::{ProcessError, Processor, Record};
use serde_json::Value;
use siphasher::sip128::{Hasher128, SipHasher13};
use std::collections::HashSet;
use std::hash::Hasher;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchLogic {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchAction {
    Pass,
    Drop,
}

/// Process-wide hash key, seeded once per run.
fn hash_keys() -> (u64, u64) {
    static KEYS: OnceLock<(u64, u64)> = OnceLock::new();
    *KEYS.get_or_init(|| (rand::random(), rand::random()))
}

fn hash_value(s: &str) -> u128 {
    let (k0, k1) = hash_keys();
    let mut h = SipHasher13::new_with_keys(k0, k1);
    h.write(s.as_bytes());
    h.finish128().as_u128()
}

struct FieldSet {
    path: PathSpec,
    members: HashSet<u128>,
}

pub struct JsonFilterConfig {
    fields: Vec<FieldSet>,
    logic: MatchLogic,
    action: MatchAction,
}

impl JsonFilterConfig {
    /// Loads `Field-Filter` entries of the form `fieldname,path_to_file`.
    pub fn load(sec: &KvSection) -> Result<Self, ConfigError> {
        let mut fields = Vec::new();
        for raw in sec.get_strings("Field-Filter") {
            let (field, file) = raw.split_once(',').ok_or_else(|| {
                ConfigError::bad_value(
                    sec.name(),
                    "Field-Filter",
                    format!("expected fieldname,path_to_file, got {raw:?}"),
                )
            })?;
            let path = PathSpec::parse(field.trim())
                .map_err(|e| ConfigError::bad_value(sec.name(), "Field-Filter", e))?;
            let text = std::fs::read_to_string(file.trim()).map_err(|e| {
                ConfigError::build(sec.name(), format!("filter file {file:?}: {e}"))
            })?;
            let members = text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(hash_value)
                .collect();
            fields.push(FieldSet { path, members });
        }
        if fields.is_empty() {
            return Err(ConfigError::MissingKey {
                section: sec.name().to_string(),
                key: "Field-Filter".to_string(),
            });
        }

        let logic = match sec
            .get_string("Match-Logic")
            .unwrap_or_else(|| "and".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "and" => MatchLogic::And,
            "or" => MatchLogic::Or,
            other => {
                return Err(ConfigError::bad_value(
                    sec.name(),
                    "Match-Logic",
                    format!("expected and/or, got {other:?}"),
                ))
            }
        };
        let action = match sec
            .get_string("Match-Action")
            .unwrap_or_else(|| "pass".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "pass" => MatchAction::Pass,
            "drop" => MatchAction::Drop,
            other => {
                return Err(ConfigError::bad_value(
                    sec.name(),
                    "Match-Action",
                    format!("expected pass/drop, got {other:?}"),
                ))
            }
        };

        Ok(Self {
            fields,
            logic,
            action,
        })
    }

    /// Builds a config directly from in-memory sets; the test seam.
    pub fn from_parts(
        fields: Vec<(PathSpec, Vec<String>)>,
        logic: MatchLogic,
        action: MatchAction,
    ) -> Self {
        Self {
            fields: fields
                .into_iter()
                .map(|(path, values)| FieldSet {
                    path,
                    members: values.iter().map(|v| hash_value(v)).collect(),
                })
                .collect(),
            logic,
            action,
        }
    }
}

pub struct JsonFilter {
    cfg: JsonFilterConfig,
}

impl JsonFilter {
    pub fn new(cfg: JsonFilterConfig) -> Self {
        Self { cfg }
    }

    pub fn from_section(sec: &KvSection) -> Result<Self, ConfigError> {
        Ok(Self::new(JsonFilterConfig::load(sec)?))
    }

    fn matches(&self, data: &[u8]) -> bool {
        let Ok(doc) = serde_json::from_slice::<Value>(data) else {
            return false;
        };
        match self.cfg.logic {
            // All fields found and all hits.
            MatchLogic::And => self.cfg.fields.iter().all(|f| {
                f.path
                    .lookup(&doc)
                    .map(|v| f.members.contains(&hash_value(&value_key_string(v))))
                    .unwrap_or(false)
            }),
            // Any field found and hit.
            MatchLogic::Or => self.cfg.fields.iter().any(|f| {
                f.path
                    .lookup(&doc)
                    .map(|v| f.members.contains(&hash_value(&value_key_string(v))))
                    .unwrap_or(false)
            }),
        }
    }
}

impl Processor for JsonFilter {
    fn process(&mut self, mut batch: Vec<Record>) -> Result<Vec<Record>, ProcessError> {
        let pass_on_match = self.cfg.action == MatchAction::Pass;
        batch.retain(|rec| {
            let hit = self.matches(&rec.data);
            hit == pass_on_match
        });
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logpipe_core::{Tag, Timestamp};
    use std::io::Write;

    fn rec(data: &str) -> Record {
        Record::with_data(Tag(0), Timestamp::new(1, 0), data.as_bytes().to_vec())
    }

    fn filter(
        fields: Vec<(&str, Vec<&str>)>,
        logic: MatchLogic,
        action: MatchAction,
    ) -> JsonFilter {
        JsonFilter::new(JsonFilterConfig::from_parts(
            fields
                .into_iter()
                .map(|(p, vs)| {
                    (
                        PathSpec::parse(p).unwrap(),
                        vs.into_iter().map(String::from).collect(),
                    )
                })
                .collect(),
            logic,
            action,
        ))
    }

    #[test]
    fn test_pass_on_match() {
        let mut f = filter(
            vec![("user", vec!["alice", "bob"])],
            MatchLogic::And,
            MatchAction::Pass,
        );
        let out = f
            .process(vec![rec(r#"{"user":"alice"}"#), rec(r#"{"user":"mallory"}"#)])
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data, br#"{"user":"alice"}"#);
    }

    #[test]
    fn test_drop_on_match() {
        let mut f = filter(
            vec![("user", vec!["alice"])],
            MatchLogic::And,
            MatchAction::Drop,
        );
        let out = f
            .process(vec![rec(r#"{"user":"alice"}"#), rec(r#"{"user":"bob"}"#)])
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data, br#"{"user":"bob"}"#);
    }

    #[test]
    fn test_and_requires_all_fields() {
        let mut f = filter(
            vec![("user", vec!["alice"]), ("app", vec!["ssh"])],
            MatchLogic::And,
            MatchAction::Pass,
        );
        let out = f
            .process(vec![
                rec(r#"{"user":"alice","app":"ssh"}"#),
                rec(r#"{"user":"alice","app":"web"}"#),
                rec(r#"{"user":"alice"}"#),
            ])
            .unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_or_accepts_any_hit() {
        let mut f = filter(
            vec![("user", vec!["alice"]), ("app", vec!["ssh"])],
            MatchLogic::Or,
            MatchAction::Pass,
        );
        let out = f
            .process(vec![
                rec(r#"{"app":"ssh"}"#),
                rec(r#"{"app":"web"}"#),
            ])
            .unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_non_string_values_hash_as_tokens() {
        let mut f = filter(
            vec![("code", vec!["404"])],
            MatchLogic::And,
            MatchAction::Pass,
        );
        let out = f.process(vec![rec(r#"{"code":404}"#)]).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_load_from_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "alice\nbob\n\n  carol  ").unwrap();

        let mut sec = KvSection::new("f");
        sec.push_str("type", "jsonfilter");
        sec.push_str(
            "Field-Filter",
            format!("user,{}", tmp.path().display()),
        );
        sec.push_str("Match-Action", "pass");
        let mut f = JsonFilter::from_section(&sec).unwrap();
        let out = f
            .process(vec![rec(r#"{"user":"carol"}"#), rec(r#"{"user":"dave"}"#)])
            .unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_missing_file_fails_construction() {
        let mut sec = KvSection::new("f");
        sec.push_str("type", "jsonfilter");
        sec.push_str("Field-Filter", "user,/nonexistent/filter/file");
        assert!(JsonFilterConfig::load(&sec).is_err());
    }
}
