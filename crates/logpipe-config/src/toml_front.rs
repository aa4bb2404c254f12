//! TOML front-end: maps `[preprocessor.NAME]` tables onto [`KvSection`]s.

use crate::section::{KvSection, KvValue};
use crate::ConfigError;
use std::path::Path;
use toml::Value;

/// Every preprocessor section found in a config document, in file order.
#[derive(Debug, Default)]
pub struct PipelineConfig {
    sections: Vec<KvSection>,
}

impl PipelineConfig {
    pub fn parse_toml(text: &str) -> Result<Self, ConfigError> {
        let root: toml::Table = text
            .parse()
            .map_err(|e: toml::de::Error| ConfigError::Parse(e.to_string()))?;

        let mut sections = Vec::new();
        if let Some(pre) = root.get("preprocessor") {
            let table = pre.as_table().ok_or_else(|| {
                ConfigError::Parse("preprocessor must be a table of named sections".to_string())
            })?;
            for (name, body) in table {
                let body = body.as_table().ok_or_else(|| {
                    ConfigError::Parse(format!("preprocessor {name:?} must be a table"))
                })?;
                let mut sec = KvSection::new(name.clone());
                for (key, value) in body {
                    push_value(&mut sec, name, key, value)?;
                }
                sections.push(sec);
            }
        }
        Ok(Self { sections })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse_toml(&text)
    }

    pub fn section(&self, name: &str) -> Option<&KvSection> {
        self.sections.iter().find(|s| s.name() == name)
    }

    pub fn sections(&self) -> impl Iterator<Item = &KvSection> {
        self.sections.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.name()).collect()
    }
}

fn push_value(
    sec: &mut KvSection,
    section: &str,
    key: &str,
    value: &Value,
) -> Result<(), ConfigError> {
    match value {
        Value::String(s) => sec.push(key, KvValue::Str(s.clone())),
        Value::Integer(i) => sec.push(key, KvValue::Int(*i)),
        Value::Boolean(b) => sec.push(key, KvValue::Bool(*b)),
        // INI-style repeated keys arrive as TOML arrays.
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::Array(_) => {
                        return Err(ConfigError::bad_value(
                            section,
                            key,
                            "nested arrays are not supported",
                        ))
                    }
                    other => push_value(sec, section, key, other)?,
                }
            }
        }
        other => {
            return Err(ConfigError::bad_value(
                section,
                key,
                format!("unsupported value type {:?}", other.type_str()),
            ))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
[preprocessor.gz]
type = "gzip"
passthrough-non-gzip = true

[preprocessor.router]
type = "srcrouter"
route = ["192.168.1.0/24:lan", "10.0.0.1:mgmt"]
drop-misses = false
"#;

    #[test]
    fn test_sections_in_file_order() {
        let cfg = PipelineConfig::parse_toml(DOC).unwrap();
        assert_eq!(cfg.names(), vec!["gz", "router"]);
    }

    #[test]
    fn test_arrays_become_repeated_keys() {
        let cfg = PipelineConfig::parse_toml(DOC).unwrap();
        let router = cfg.section("router").unwrap();
        assert_eq!(
            router.get_strings("Route"),
            vec!["192.168.1.0/24:lan", "10.0.0.1:mgmt"]
        );
    }

    #[test]
    fn test_kind_and_bools() {
        let cfg = PipelineConfig::parse_toml(DOC).unwrap();
        let gz = cfg.section("gz").unwrap();
        assert_eq!(gz.kind().unwrap(), "gzip");
        assert!(gz.get_bool("Passthrough-Non-Gzip", false).unwrap());
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        assert!(matches!(
            PipelineConfig::parse_toml("not = [toml"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_float_values_rejected() {
        let doc = "[preprocessor.x]\ntype = \"drop\"\nweight = 1.5\n";
        assert!(PipelineConfig::parse_toml(doc).is_err());
    }
}
