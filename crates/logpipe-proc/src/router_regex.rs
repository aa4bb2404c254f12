//! Regex router: re-tags records by a named capture of their body.

use crate::route::{parse_route_map, RouteTarget};
use logpipe_config::{ConfigError, KvSection};
use logpipe_core::{ProcessError, Processor, Record, Tagger};
use regex::bytes::Regex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RegexRouterConfig {
    pub regex: String,
    /// Capture to route on; may be omitted when the regex has exactly one
    /// named capture.
    pub capture_name: Option<String>,
    pub routes: Vec<String>,
    pub drop_misses: bool,
}

impl RegexRouterConfig {
    pub fn load(sec: &KvSection) -> Result<Self, ConfigError> {
        Ok(Self {
            regex: sec.require_string("Regex")?,
            capture_name: sec.get_string("Capture-Name"),
            routes: sec.get_strings("Route"),
            drop_misses: sec.get_bool("Drop-Misses", false)?,
        })
    }
}

pub struct RegexRouter {
    re: Regex,
    group: usize,
    routes: HashMap<String, RouteTarget>,
    drop_misses: bool,
}

impl RegexRouter {
    pub fn from_section(sec: &KvSection, tagger: Arc<dyn Tagger>) -> Result<Self, ConfigError> {
        let cfg = RegexRouterConfig::load(sec)?;
        let re = Regex::new(&cfg.regex)
            .map_err(|e| ConfigError::build(sec.name(), format!("bad regex: {e}")))?;

        let group = match &cfg.capture_name {
            Some(name) => re
                .capture_names()
                .position(|n| n == Some(name.as_str()))
                .ok_or_else(|| {
                    ConfigError::build(sec.name(), format!("no capture named {name:?}"))
                })?,
            None => {
                let named: Vec<usize> = re
                    .capture_names()
                    .enumerate()
                    .filter(|(_, n)| n.is_some())
                    .map(|(i, _)| i)
                    .collect();
                match named.as_slice() {
                    [only] => *only,
                    _ => {
                        return Err(ConfigError::build(
                            sec.name(),
                            "regex must have exactly one named capture, or set Capture-Name",
                        ))
                    }
                }
            }
        };

        Ok(Self {
            re,
            group,
            routes: parse_route_map(sec, tagger.as_ref())?,
            drop_misses: cfg.drop_misses,
        })
    }
}

impl Processor for RegexRouter {
    fn process(&mut self, mut batch: Vec<Record>) -> Result<Vec<Record>, ProcessError> {
        batch.retain_mut(|rec| {
            let target = self
                .re
                .captures(&rec.data)
                .and_then(|caps| caps.get(self.group))
                .and_then(|m| std::str::from_utf8(m.as_bytes()).ok())
                .and_then(|key| self.routes.get(key));
            match target {
                Some(RouteTarget::Tag(tag)) => {
                    rec.tag = *tag;
                    true
                }
                Some(RouteTarget::Drop) => false,
                None => !self.drop_misses,
            }
        });
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logpipe_core::{MemoryTagger, Tag, Timestamp};

    fn rec(data: &str) -> Record {
        Record::with_data(Tag(0), Timestamp::new(1, 0), data.as_bytes().to_vec())
    }

    fn router(drop_misses: bool) -> (RegexRouter, Arc<MemoryTagger>) {
        let tagger = Arc::new(MemoryTagger::new());
        let mut sec = KvSection::new("rr");
        sec.push_str("type", "regexrouter");
        sec.push_str("Regex", r"app=(?P<app>\S+)");
        sec.push_str("Route", "nginx:web");
        sec.push_str("Route", "sshd:auth");
        sec.push_str("Route", "noisy:");
        if drop_misses {
            sec.push_str("Drop-Misses", "true");
        }
        let r = RegexRouter::from_section(&sec, tagger.clone()).unwrap();
        (r, tagger)
    }

    #[test]
    fn test_routes_by_capture() {
        let (mut r, tagger) = router(false);
        let web = tagger.negotiate("web").unwrap();
        let auth = tagger.negotiate("auth").unwrap();
        let out = r
            .process(vec![rec("app=nginx hit"), rec("app=sshd denied")])
            .unwrap();
        assert_eq!(out[0].tag, web);
        assert_eq!(out[1].tag, auth);
        // Routers must not touch the body.
        assert_eq!(out[0].data, b"app=nginx hit");
    }

    #[test]
    fn test_empty_tag_route_drops() {
        let (mut r, _) = router(false);
        assert!(r.process(vec![rec("app=noisy spam")]).unwrap().is_empty());
    }

    #[test]
    fn test_miss_policy() {
        let (mut r, _) = router(false);
        let out = r.process(vec![rec("no app here"), rec("app=unknown")]).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].tag, Tag(0));

        let (mut r, _) = router(true);
        assert!(r
            .process(vec![rec("no app here"), rec("app=unknown")])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_idempotent_construction() {
        let tagger = Arc::new(MemoryTagger::new());
        let mut sec = KvSection::new("rr");
        sec.push_str("type", "regexrouter");
        sec.push_str("Regex", r"(?P<k>\S+)");
        sec.push_str("Route", "a:first");
        sec.push_str("Route", "b:second");
        let _ = RegexRouter::from_section(&sec, tagger.clone()).unwrap();
        let snapshot = tagger.known_tags();
        let _ = RegexRouter::from_section(&sec, tagger.clone()).unwrap();
        assert_eq!(tagger.known_tags(), snapshot);
    }
}
