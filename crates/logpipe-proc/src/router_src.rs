//! Source router: re-tags records by longest-prefix match of their source
//! address.

use crate::prefix_tree::PrefixTree;
use crate::route::{negotiate_target, split_route, RouteTarget};
use ipnet::IpNet;
use logpipe_config::{ConfigError, KvSection};
use logpipe_core::{ProcessError, Processor, Record, Tagger};
use std::net::IpAddr;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SrcRouterConfig {
    pub routes: Vec<String>,
    pub drop_misses: bool,
}

impl SrcRouterConfig {
    pub fn load(sec: &KvSection) -> Result<Self, ConfigError> {
        Ok(Self {
            routes: sec.get_strings("Route"),
            drop_misses: sec.get_bool("Drop-Misses", false)?,
        })
    }
}

pub struct SrcRouter {
    tree: PrefixTree<RouteTarget>,
    drop_misses: bool,
}

impl SrcRouter {
    pub fn from_section(sec: &KvSection, tagger: Arc<dyn Tagger>) -> Result<Self, ConfigError> {
        let cfg = SrcRouterConfig::load(sec)?;
        if cfg.routes.is_empty() {
            return Err(ConfigError::MissingKey {
                section: sec.name().to_string(),
                key: "Route".to_string(),
            });
        }

        let mut tree = PrefixTree::new();
        for raw in &cfg.routes {
            let (value, tag) = split_route(sec, raw)?;
            let net = parse_net(value).ok_or_else(|| {
                ConfigError::bad_value(
                    sec.name(),
                    "Route",
                    format!("{value:?} is not an IP or CIDR"),
                )
            })?;
            let target = negotiate_target(sec, tagger.as_ref(), tag)?;
            tree.insert(net, target);
        }

        Ok(Self {
            tree,
            drop_misses: cfg.drop_misses,
        })
    }
}

/// Accepts a CIDR or a bare address; bare addresses become host routes.
fn parse_net(s: &str) -> Option<IpNet> {
    if let Ok(net) = s.parse::<IpNet>() {
        return Some(net);
    }
    let ip = s.parse::<IpAddr>().ok()?;
    Some(IpNet::from(ip))
}

impl Processor for SrcRouter {
    fn process(&mut self, mut batch: Vec<Record>) -> Result<Vec<Record>, ProcessError> {
        batch.retain_mut(|rec| match self.tree.longest_match(rec.src) {
            Some(RouteTarget::Tag(tag)) => {
                rec.tag = *tag;
                true
            }
            Some(RouteTarget::Drop) => false,
            None => !self.drop_misses,
        });
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logpipe_core::{MemoryTagger, Tag, Timestamp};

    fn rec(src: &str) -> Record {
        let mut r = Record::with_data(Tag(0), Timestamp::new(1, 0), b"x".to_vec());
        r.src = src.parse().unwrap();
        r
    }

    fn router(drop_misses: bool) -> (SrcRouter, Arc<MemoryTagger>) {
        let tagger = Arc::new(MemoryTagger::new());
        let mut sec = KvSection::new("sr");
        sec.push_str("type", "srcrouter");
        for route in [
            "1.1.1.1:foo",
            "2.2.2.2:bar",
            "3.3.3.3:",
            "4.4.4.4:",
            "6.0.0.0/8:",
            "7.7.0.0/16:foo",
            "8.8.8.0/24:bar",
        ] {
            sec.push_str("Route", route);
        }
        if drop_misses {
            sec.push_str("Drop-Misses", "true");
        }
        let r = SrcRouter::from_section(&sec, tagger.clone()).unwrap();
        (r, tagger)
    }

    #[test]
    fn test_longest_prefix_table() {
        let (mut r, tagger) = router(false);
        let foo = tagger.negotiate("foo").unwrap();
        let bar = tagger.negotiate("bar").unwrap();

        let srcs = [
            "1.1.1.1", "2.2.2.2", "3.3.3.3", "4.4.4.4", "5.5.5.5", "6.6.6.6", "7.7.7.7",
            "8.8.8.8",
        ];
        let out = r.process(srcs.iter().map(|s| rec(s)).collect()).unwrap();

        // 3.3.3.3 / 4.4.4.4 / 6.6.6.6 drop; 5.5.5.5 keeps its original tag.
        let tags: Vec<(String, Tag)> = out
            .iter()
            .map(|r| (r.src.to_string(), r.tag))
            .collect();
        assert_eq!(
            tags,
            vec![
                ("1.1.1.1".to_string(), foo),
                ("2.2.2.2".to_string(), bar),
                ("5.5.5.5".to_string(), Tag(0)),
                ("7.7.7.7".to_string(), foo),
                ("8.8.8.8".to_string(), bar),
            ]
        );
    }

    #[test]
    fn test_drop_misses() {
        let (mut r, _) = router(true);
        let out = r.process(vec![rec("5.5.5.5")]).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_v6_routes() {
        let tagger = Arc::new(MemoryTagger::new());
        let mut sec = KvSection::new("sr");
        sec.push_str("type", "srcrouter");
        sec.push_str("Route", "fd00::/8:internal");
        let mut r = SrcRouter::from_section(&sec, tagger.clone()).unwrap();
        let internal = tagger.negotiate("internal").unwrap();
        let out = r.process(vec![rec("fd00::99")]).unwrap();
        assert_eq!(out[0].tag, internal);
    }

    #[test]
    fn test_bad_cidr_fails_construction() {
        let tagger = Arc::new(MemoryTagger::new());
        let mut sec = KvSection::new("sr");
        sec.push_str("type", "srcrouter");
        sec.push_str("Route", "not-an-ip:tag");
        assert!(SrcRouter::from_section(&sec, tagger).is_err());
    }
}
