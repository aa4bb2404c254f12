//! Syslog router: renders a tag template from parsed syslog fields.

use crate::syslog::{self, SyslogMessage};
use logpipe_config::{ConfigError, KvSection};
use logpipe_core::{
    sanitize_tag_name, Formatter, NamedFields, ProcessError, Processor, Record, Tag, Tagger,
};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SyslogRouterConfig {
    /// Template rendered against parsed fields, e.g.
    /// `${Hostname}-${Appname}`.
    pub template: String,
    /// Drop records the syslog parser rejects; default passes them through.
    pub drop_misses: bool,
}

impl SyslogRouterConfig {
    pub fn load(sec: &KvSection) -> Result<Self, ConfigError> {
        Ok(Self {
            template: sec.require_string("Template")?,
            drop_misses: sec.get_bool("Drop-Misses", false)?,
        })
    }
}

pub struct SyslogRouter {
    fmt: Formatter,
    tagger: Arc<dyn Tagger>,
    /// Rendered name → negotiated tag. Tags here are discovered at runtime,
    /// so negotiation happens on first sight, not at construction.
    cache: HashMap<String, Tag>,
    drop_misses: bool,
}

impl SyslogRouter {
    pub fn from_section(sec: &KvSection, tagger: Arc<dyn Tagger>) -> Result<Self, ConfigError> {
        let cfg = SyslogRouterConfig::load(sec)?;
        let fmt = Formatter::compile(&cfg.template)
            .map_err(|e| ConfigError::build(sec.name(), e.to_string()))?;
        Ok(Self {
            fmt,
            tagger,
            cache: HashMap::new(),
            drop_misses: cfg.drop_misses,
        })
    }

    fn tag_for(&mut self, name: String) -> Option<Tag> {
        if let Some(tag) = self.cache.get(&name) {
            return Some(*tag);
        }
        match self.tagger.negotiate(&name) {
            Ok(tag) => {
                self.cache.insert(name, tag);
                Some(tag)
            }
            Err(e) => {
                debug!(tag = %name, error = %e, "tag negotiation failed");
                None
            }
        }
    }
}

impl Processor for SyslogRouter {
    fn process(&mut self, mut batch: Vec<Record>) -> Result<Vec<Record>, ProcessError> {
        let drop_misses = self.drop_misses;
        let mut keep = Vec::with_capacity(batch.len());
        for mut rec in batch.drain(..) {
            let rendered = match syslog::parse(&rec.data) {
                Ok(msg) => {
                    let fields = MessageFields(&msg);
                    let raw = self.fmt.render_named(&rec, &fields);
                    Some(sanitize_tag_name(&String::from_utf8_lossy(&raw)))
                }
                Err(_) => None,
            };
            match rendered.filter(|name| !name.is_empty()) {
                Some(name) => match self.tag_for(name) {
                    Some(tag) => {
                        rec.tag = tag;
                        keep.push(rec);
                    }
                    None => {
                        if !drop_misses {
                            keep.push(rec);
                        }
                    }
                },
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

/// Field accessor the formatter renders against.
struct MessageFields<'a>(&'a SyslogMessage<'a>);

impl NamedFields for MessageFields<'_> {
    fn field(&self, name: &str) -> Option<Cow<'_, [u8]>> {
        let msg = self.0;
        fn borrowed(v: Option<&[u8]>) -> Option<Cow<'_, [u8]>> {
            v.map(Cow::Borrowed)
        }
        match name {
            "Hostname" => borrowed(msg.hostname),
            "Appname" => borrowed(msg.appname),
            "Timestamp" => borrowed(msg.timestamp),
            "ProcID" => borrowed(msg.procid),
            "MsgID" => borrowed(msg.msgid),
            "StructuredData" => borrowed(msg.structured_data),
            "Message" => borrowed(msg.message),
            "Facility" => msg.facility.map(|v| Cow::Owned(v.to_string().into_bytes())),
            "Severity" => msg.severity.map(|v| Cow::Owned(v.to_string().into_bytes())),
            "Priority" => match (msg.facility, msg.severity) {
                (Some(f), Some(s)) => Some(Cow::Owned((f as u16 * 8 + s as u16).to_string().into_bytes())),
                _ => None,
            },
            "Version" => msg.version.map(|v| Cow::Owned(v.to_string().into_bytes())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logpipe_core::{MemoryTagger, Timestamp};

    fn rec(data: &[u8]) -> Record {
        Record::with_data(Tag(0), Timestamp::new(1, 0), data.to_vec())
    }

    fn router(template: &str, drop_misses: bool) -> (SyslogRouter, Arc<MemoryTagger>) {
        let tagger = Arc::new(MemoryTagger::new());
        let mut sec = KvSection::new("slr");
        sec.push_str("type", "syslogrouter");
        sec.push_str("Template", template);
        if drop_misses {
            sec.push_str("Drop-Misses", "true");
        }
        let r = SyslogRouter::from_section(&sec, tagger.clone()).unwrap();
        (r, tagger)
    }

    #[test]
    fn test_rfc5424_remap() {
        let (mut r, tagger) = router("${Hostname}-${Appname}", false);
        let out = r
            .process(vec![rec(
                b"<34>1 2003-10-11T22:14:15.003Z foobar su - ID47 - 'su root' failed for lonvick",
            )])
            .unwrap();
        let expect = tagger.negotiate("foobar-su").unwrap();
        assert_eq!(out[0].tag, expect);
    }

    #[test]
    fn test_rfc3164_remap_sanitises_forbidden_characters() {
        let (mut r, tagger) = router("${Hostname}-${Appname}", false);
        let out = r
            .process(vec![rec(b"<34>Oct 11 22:14:15 box foo!bar#baz: stuff")])
            .unwrap();
        let expect = tagger.negotiate("box-foo_bar_baz").unwrap();
        assert_eq!(out[0].tag, expect);
    }

    #[test]
    fn test_repeated_names_hit_the_cache() {
        let (mut r, tagger) = router("${Appname}", false);
        let line: &[u8] = b"<13>Oct 11 22:14:15 host app: one";
        r.process(vec![rec(line), rec(line)]).unwrap();
        assert_eq!(tagger.known_tags(), vec!["app"]);
        assert_eq!(r.cache.len(), 1);
    }

    #[test]
    fn test_unparseable_policy() {
        let (mut r, _) = router("${Hostname}", false);
        let out = r.process(vec![rec(b"")]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].tag, Tag(0));

        let (mut r, _) = router("${Hostname}", true);
        assert!(r.process(vec![rec(b"")]).unwrap().is_empty());
    }

    #[test]
    fn test_data_never_mutated() {
        let (mut r, _) = router("${Hostname}-${Appname}", false);
        let line = b"<34>1 - host app - - - body".to_vec();
        let out = r.process(vec![rec(&line)]).unwrap();
        assert_eq!(out[0].data, line);
    }
}
