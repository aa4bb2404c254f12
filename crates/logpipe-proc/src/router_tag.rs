//! Tag router: re-tags on the pair (current tag, source address).

use ipnet::IpNet;
use logpipe_config::{ConfigError, KvSection};
use logpipe_core::{ProcessError, Processor, Record, Tag, Tagger};
use std::net::IpAddr;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct TagRouterConfig {
    pub routes: Vec<String>,
}

impl TagRouterConfig {
    pub fn load(sec: &KvSection) -> Result<Self, ConfigError> {
        Ok(Self {
            routes: sec.get_strings("Route"),
        })
    }
}

#[derive(Debug)]
struct TagRule {
    src_tag: Tag,
    /// `None` drops the record.
    dst_tag: Option<Tag>,
    net: Option<IpNet>,
}

/// Rules are `srcTag:dstTag[:ipOrCidr]`, evaluated in order; first match
/// wins. Records matching no rule keep their original tag.
pub struct TagRouter {
    rules: Vec<TagRule>,
}

impl TagRouter {
    pub fn from_section(sec: &KvSection, tagger: Arc<dyn Tagger>) -> Result<Self, ConfigError> {
        let cfg = TagRouterConfig::load(sec)?;
        if cfg.routes.is_empty() {
            return Err(ConfigError::MissingKey {
                section: sec.name().to_string(),
                key: "Route".to_string(),
            });
        }

        let mut rules = Vec::with_capacity(cfg.routes.len());
        for raw in &cfg.routes {
            // Tag names never contain colons, so the optional CIDR is
            // whatever remains after the second one (IPv6 included).
            let mut parts = raw.splitn(3, ':');
            let src = parts.next().unwrap_or_default().trim();
            let dst = parts.next().map(str::trim);
            let net = parts.next().map(str::trim);

            let Some(dst) = dst else {
                return Err(ConfigError::bad_value(
                    sec.name(),
                    "Route",
                    format!("expected srcTag:dstTag[:ipOrCidr], got {raw:?}"),
                ));
            };
            if src.is_empty() {
                return Err(ConfigError::bad_value(
                    sec.name(),
                    "Route",
                    format!("route {raw:?} has an empty source tag"),
                ));
            }

            let src_tag = tagger
                .negotiate(src)
                .map_err(|e| ConfigError::build(sec.name(), e.to_string()))?;
            let dst_tag = if dst.is_empty() {
                None
            } else {
                Some(
                    tagger
                        .negotiate(dst)
                        .map_err(|e| ConfigError::build(sec.name(), e.to_string()))?,
                )
            };
            let net = match net {
                None | Some("") => None,
                Some(raw_net) => Some(parse_net(raw_net).ok_or_else(|| {
                    ConfigError::bad_value(
                        sec.name(),
                        "Route",
                        format!("{raw_net:?} is not an IP or CIDR"),
                    )
                })?),
            };

            rules.push(TagRule {
                src_tag,
                dst_tag,
                net,
            });
        }

        Ok(Self { rules })
    }
}

fn parse_net(s: &str) -> Option<IpNet> {
    if let Ok(net) = s.parse::<IpNet>() {
        return Some(net);
    }
    s.parse::<IpAddr>().ok().map(IpNet::from)
}

impl Processor for TagRouter {
    fn process(&mut self, mut batch: Vec<Record>) -> Result<Vec<Record>, ProcessError> {
        batch.retain_mut(|rec| {
            for rule in &self.rules {
                if rule.src_tag != rec.tag {
                    continue;
                }
                if let Some(net) = &rule.net {
                    if !net.contains(&rec.src) {
                        continue;
                    }
                }
                return match rule.dst_tag {
                    Some(dst) => {
                        rec.tag = dst;
                        true
                    }
                    None => false,
                };
            }
            true
        });
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logpipe_core::{MemoryTagger, Timestamp};

    fn rec(tag: Tag, src: &str) -> Record {
        let mut r = Record::with_data(tag, Timestamp::new(1, 0), b"x".to_vec());
        r.src = src.parse().unwrap();
        r
    }

    fn build(routes: &[&str]) -> (TagRouter, Arc<MemoryTagger>) {
        let tagger = Arc::new(MemoryTagger::new());
        let mut sec = KvSection::new("tr");
        sec.push_str("type", "tagrouter");
        for r in routes {
            sec.push_str("Route", *r);
        }
        let router = TagRouter::from_section(&sec, tagger.clone()).unwrap();
        (router, tagger)
    }

    #[test]
    fn test_retag_by_source_tag() {
        let (mut r, tagger) = build(&["old:new"]);
        let old = tagger.negotiate("old").unwrap();
        let new = tagger.negotiate("new").unwrap();
        let out = r.process(vec![rec(old, "1.2.3.4")]).unwrap();
        assert_eq!(out[0].tag, new);
    }

    #[test]
    fn test_cidr_scoped_rule() {
        let (mut r, tagger) = build(&["old:new:192.168.0.0/16"]);
        let old = tagger.negotiate("old").unwrap();
        let new = tagger.negotiate("new").unwrap();
        let out = r
            .process(vec![rec(old, "192.168.9.9"), rec(old, "10.0.0.1")])
            .unwrap();
        assert_eq!(out[0].tag, new);
        assert_eq!(out[1].tag, old);
    }

    #[test]
    fn test_no_match_preserves_tag() {
        let (mut r, tagger) = build(&["old:new"]);
        let other = tagger.negotiate("other").unwrap();
        let out = r.process(vec![rec(other, "1.1.1.1")]).unwrap();
        assert_eq!(out[0].tag, other);
    }

    #[test]
    fn test_empty_destination_drops() {
        let (mut r, tagger) = build(&["old::10.0.0.0/8"]);
        let old = tagger.negotiate("old").unwrap();
        let out = r
            .process(vec![rec(old, "10.1.1.1"), rec(old, "11.1.1.1")])
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].src.to_string(), "11.1.1.1");
    }

    #[test]
    fn test_first_match_wins() {
        let (mut r, tagger) = build(&["old:first:10.0.0.0/8", "old:second"]);
        let old = tagger.negotiate("old").unwrap();
        let first = tagger.negotiate("first").unwrap();
        let second = tagger.negotiate("second").unwrap();
        let out = r
            .process(vec![rec(old, "10.2.2.2"), rec(old, "12.0.0.1")])
            .unwrap();
        assert_eq!(out[0].tag, first);
        assert_eq!(out[1].tag, second);
    }
}
