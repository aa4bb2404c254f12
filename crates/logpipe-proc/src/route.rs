//! Shared route-table plumbing for the content routers.

use logpipe_config::{ConfigError, KvSection};
use logpipe_core::{Tag, Tagger};
use std::collections::HashMap;

/// Where a routed record goes: a destination tag, or nowhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    Tag(Tag),
    Drop,
}

/// Parses repeated `Route` entries of the form `val:tag` into a value →
/// target map. An empty tag means drop. Every destination tag is
/// negotiated here; a failed negotiation fails construction.
pub(crate) fn parse_route_map(
    sec: &KvSection,
    tagger: &dyn Tagger,
) -> Result<HashMap<String, RouteTarget>, ConfigError> {
    let mut map = HashMap::new();
    for raw in sec.get_strings("Route") {
        let (value, target) = split_route(sec, &raw)?;
        let target = negotiate_target(sec, tagger, target)?;
        map.insert(value.to_string(), target);
    }
    if map.is_empty() {
        return Err(ConfigError::MissingKey {
            section: sec.name().to_string(),
            key: "Route".to_string(),
        });
    }
    Ok(map)
}

/// Splits `val:tag` on the final colon, so values may themselves contain
/// colons; tag names never do.
pub(crate) fn split_route<'a>(
    sec: &KvSection,
    raw: &'a str,
) -> Result<(&'a str, &'a str), ConfigError> {
    let (value, tag) = raw.rsplit_once(':').ok_or_else(|| {
        ConfigError::bad_value(
            sec.name(),
            "Route",
            format!("expected value:tag, got {raw:?}"),
        )
    })?;
    if value.is_empty() {
        return Err(ConfigError::bad_value(
            sec.name(),
            "Route",
            format!("route {raw:?} has an empty value"),
        ));
    }
    Ok((value, tag.trim()))
}

pub(crate) fn negotiate_target(
    sec: &KvSection,
    tagger: &dyn Tagger,
    tag: &str,
) -> Result<RouteTarget, ConfigError> {
    if tag.is_empty() {
        return Ok(RouteTarget::Drop);
    }
    tagger
        .negotiate(tag)
        .map(RouteTarget::Tag)
        .map_err(|e| ConfigError::build(sec.name(), e.to_string()))
}
