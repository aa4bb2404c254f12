//! The ordered, case-insensitive key/value section every preprocessor is
//! configured from.

use crate::ConfigError;

/// A scalar config value.
#[derive(Debug, Clone, PartialEq)]
pub enum KvValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl KvValue {
    fn type_name(&self) -> &'static str {
        match self {
            KvValue::Str(_) => "string",
            KvValue::Int(_) => "integer",
            KvValue::Bool(_) => "boolean",
        }
    }
}

/// One `[preprocessor "NAME"]` section: an insertion-ordered multimap with
/// case-insensitive keys (dash-separated option names, e.g. `Drop-Misses`).
#[derive(Debug, Clone, Default)]
pub struct KvSection {
    name: String,
    entries: Vec<(String, KvValue)>,
}

impl KvSection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends a value under `key`. Repeated keys accumulate.
    pub fn push(&mut self, key: &str, value: KvValue) {
        self.entries.push((key.to_ascii_lowercase(), value));
    }

    pub fn push_str(&mut self, key: &str, value: impl Into<String>) {
        self.push(key, KvValue::Str(value.into()));
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&KvValue> {
        let key = key.to_ascii_lowercase();
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Every value stored under `key`, in insertion order.
    pub fn get_all(&self, key: &str) -> Vec<&KvValue> {
        let key = key.to_ascii_lowercase();
        self.entries
            .iter()
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v)
            .collect()
    }

    /// First value under `key`, coerced to a string.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| match v {
            KvValue::Str(s) => s.clone(),
            KvValue::Int(i) => i.to_string(),
            KvValue::Bool(b) => b.to_string(),
        })
    }

    /// Every value under `key`, coerced to strings.
    pub fn get_strings(&self, key: &str) -> Vec<String> {
        self.get_all(key)
            .into_iter()
            .map(|v| match v {
                KvValue::Str(s) => s.clone(),
                KvValue::Int(i) => i.to_string(),
                KvValue::Bool(b) => b.to_string(),
            })
            .collect()
    }

    /// Required string value; missing or empty is an error.
    pub fn require_string(&self, key: &str) -> Result<String, ConfigError> {
        match self.get_string(key) {
            Some(s) if !s.is_empty() => Ok(s),
            _ => Err(ConfigError::MissingKey {
                section: self.name.clone(),
                key: key.to_string(),
            }),
        }
    }

    /// The required `type = <kind>` key.
    pub fn kind(&self) -> Result<String, ConfigError> {
        self.require_string("type").map(|s| s.to_ascii_lowercase())
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(KvValue::Bool(b)) => Ok(*b),
            Some(KvValue::Str(s)) => match s.to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                other => Err(ConfigError::bad_value(
                    &self.name,
                    key,
                    format!("expected boolean, got {other:?}"),
                )),
            },
            Some(v) => Err(ConfigError::bad_value(
                &self.name,
                key,
                format!("expected boolean, got {}", v.type_name()),
            )),
        }
    }

    pub fn get_u64(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(KvValue::Int(i)) if *i >= 0 => Ok(*i as u64),
            Some(KvValue::Str(s)) => s.parse::<u64>().map_err(|e| {
                ConfigError::bad_value(&self.name, key, format!("expected integer: {e}"))
            }),
            Some(v) => Err(ConfigError::bad_value(
                &self.name,
                key,
                format!("expected non-negative integer, got {:?}", v),
            )),
        }
    }

    pub fn get_usize(&self, key: &str, default: usize) -> Result<usize, ConfigError> {
        self.get_u64(key, default as u64).map(|v| v as usize)
    }

    /// True when the section carries the key at all.
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}
