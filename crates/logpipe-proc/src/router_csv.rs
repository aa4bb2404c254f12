//! CSV router: re-tags records by one comma-separated field of their body.

use crate::route::{parse_route_map, RouteTarget};
use logpipe_config::{ConfigError, KvSection};
use logpipe_core::{ProcessError, Processor, Record, Tagger};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct CsvRouterConfig {
    /// Zero-based index of the field to route on.
    pub column: usize,
    pub routes: Vec<String>,
    pub drop_misses: bool,
}

impl CsvRouterConfig {
    pub fn load(sec: &KvSection) -> Result<Self, ConfigError> {
        let column = sec.require_string("Route-Extraction")?;
        let column = column.trim().parse::<usize>().map_err(|e| {
            ConfigError::bad_value(sec.name(), "Route-Extraction", format!("bad column: {e}"))
        })?;
        Ok(Self {
            column,
            routes: sec.get_strings("Route"),
            drop_misses: sec.get_bool("Drop-Misses", false)?,
        })
    }
}

pub struct CsvRouter {
    column: usize,
    routes: HashMap<String, RouteTarget>,
    drop_misses: bool,
}

impl CsvRouter {
    pub fn from_section(sec: &KvSection, tagger: Arc<dyn Tagger>) -> Result<Self, ConfigError> {
        let cfg = CsvRouterConfig::load(sec)?;
        Ok(Self {
            column: cfg.column,
            routes: parse_route_map(sec, tagger.as_ref())?,
            drop_misses: cfg.drop_misses,
        })
    }

    /// RFC 4180 field extraction, lazy quotes off, result trimmed.
    fn extract(&self, data: &[u8]) -> Option<String> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(data);
        let mut row = csv::ByteRecord::new();
        match rdr.read_byte_record(&mut row) {
            Ok(true) => row
                .get(self.column)
                .and_then(|f| std::str::from_utf8(f).ok())
                .map(|f| f.trim().to_string()),
            _ => None,
        }
    }
}

impl Processor for CsvRouter {
    fn process(&mut self, mut batch: Vec<Record>) -> Result<Vec<Record>, ProcessError> {
        batch.retain_mut(|rec| {
            let target = self
                .extract(&rec.data)
                .and_then(|key| self.routes.get(&key));
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
