//! Regex extractor: rewrites record bodies through a capture template.

use logpipe_config::{ConfigError, KvSection};
use logpipe_core::{EnumeratedValue, Formatter, ProcessError, Processor, Record};
use regex::bytes::Regex;

#[derive(Debug, Clone)]
pub struct RegexExtractConfig {
    pub regex: String,
    pub template: String,
    pub drop_misses: bool,
    /// Named captures attached as string enumerated values on survivors.
    pub attach: Vec<String>,
}

impl RegexExtractConfig {
    pub fn load(sec: &KvSection) -> Result<Self, ConfigError> {
        let mut attach = Vec::new();
        for raw in sec.get_strings("Attach") {
            for part in raw.split(',') {
                let part = part.trim();
                if !part.is_empty() {
                    attach.push(part.to_string());
                }
            }
        }
        Ok(Self {
            regex: sec.require_string("Regex")?,
            template: sec.require_string("Template")?,
            drop_misses: sec.get_bool("Drop-Misses", false)?,
            attach,
        })
    }
}

pub struct RegexExtract {
    re: Regex,
    fmt: Formatter,
    attach: Vec<(String, usize)>,
    drop_misses: bool,
}

impl RegexExtract {
    pub fn new(cfg: RegexExtractConfig) -> Result<Self, ConfigError> {
        Self::build("regexextract", cfg)
    }

    pub fn from_section(sec: &KvSection) -> Result<Self, ConfigError> {
        Self::build(sec.name(), RegexExtractConfig::load(sec)?)
    }

    fn build(section: &str, cfg: RegexExtractConfig) -> Result<Self, ConfigError> {
        let re = Regex::new(&cfg.regex)
            .map_err(|e| ConfigError::build(section, format!("bad regex: {e}")))?;

        let capture_index = |name: &str| {
            re.capture_names()
                .position(|n| n == Some(name))
        };

        let mut fmt = Formatter::compile(&cfg.template)
            .map_err(|e| ConfigError::build(section, e.to_string()))?;
        fmt.bind(capture_index)
            .map_err(|e| ConfigError::build(section, e.to_string()))?;

        let mut attach = Vec::with_capacity(cfg.attach.len());
        for name in &cfg.attach {
            let idx = capture_index(name).ok_or_else(|| {
                ConfigError::build(section, format!("attach name {name:?} is not a capture"))
            })?;
            attach.push((name.clone(), idx));
        }

        Ok(Self {
            re,
            fmt,
            attach,
            drop_misses: cfg.drop_misses,
        })
    }
}

impl Processor for RegexExtract {
    fn process(&mut self, mut batch: Vec<Record>) -> Result<Vec<Record>, ProcessError> {
        let drop_misses = self.drop_misses;
        let re = &self.re;
        let fmt = &mut self.fmt;
        let attach = &self.attach;

        batch.retain_mut(|rec| {
            let (rendered, evs) = {
                let Some(caps) = re.captures(&rec.data) else {
                    return !drop_misses;
                };
                let matches: Vec<Option<&[u8]>> =
                    (0..caps.len()).map(|i| caps.get(i).map(|m| m.as_bytes())).collect();
                let rendered = fmt.render_indexed(rec, &matches);
                let evs: Vec<EnumeratedValue> = attach
                    .iter()
                    .filter_map(|(name, idx)| {
                        caps.get(*idx).map(|m| {
                            EnumeratedValue::string(
                                name.clone(),
                                String::from_utf8_lossy(m.as_bytes()).into_owned(),
                            )
                        })
                    })
                    .collect();
                (rendered, evs)
            };
            rec.data = rendered;
            rec.evs.extend(evs);
            true
        });
        Ok(batch)
    }
}
