//! Named-type dispatch: configuration sections to concrete processors.

use logpipe_buffer::PersistentBuffer;
use logpipe_config::{ConfigError, KvSection, PipelineConfig};
use logpipe_core::{EntryWriter, Processor, ProcessorSet, Tagger};
use logpipe_forward::Forwarder;
use logpipe_ise::CiscoIse;
use logpipe_proc::{
    Corelight, CsvRouter, DropAll, GzipDecompressor, JsonArraySplit, JsonExtract, JsonFilter,
    JsonTimeExtract, PluginRegistry, RegexExtract, RegexRouter, RegexTimestamp, SrcRouter,
    SyslogRouter, TagRouter, VpcUnwinder,
};
use std::sync::Arc;
use tracing::info;

/// Builds one processor from its `[preprocessor "NAME"]` section.
pub fn build_processor(
    sec: &KvSection,
    tagger: Arc<dyn Tagger>,
    plugins: &PluginRegistry,
) -> Result<Box<dyn Processor>, ConfigError> {
    let kind = sec.kind()?;
    let processor: Box<dyn Processor> = match kind.as_str() {
        "drop" => Box::new(DropAll),
        "gzip" => Box::new(GzipDecompressor::from_section(sec)?),
        "vpc" => Box::new(VpcUnwinder::from_section(sec)?),
        "jsonextract" => Box::new(JsonExtract::from_section(sec)?),
        "jsonarraysplit" => Box::new(JsonArraySplit::from_section(sec)?),
        "jsonfilter" => Box::new(JsonFilter::from_section(sec)?),
        "jsontimeextract" => Box::new(JsonTimeExtract::from_section(sec)?),
        "regexextract" => Box::new(RegexExtract::from_section(sec)?),
        "regextimestamp" => Box::new(RegexTimestamp::from_section(sec)?),
        "regexrouter" => Box::new(RegexRouter::from_section(sec, tagger)?),
        "csvrouter" => Box::new(CsvRouter::from_section(sec, tagger)?),
        "srcrouter" => Box::new(SrcRouter::from_section(sec, tagger)?),
        "syslogrouter" => Box::new(SyslogRouter::from_section(sec, tagger)?),
        "tagrouter" => Box::new(TagRouter::from_section(sec, tagger)?),
        "forwarder" => Box::new(Forwarder::from_section(sec, tagger)?),
        "gravwellforwarder" => Box::new(Forwarder::gravwell_from_section(sec, tagger)?),
        "cisco_ise" => Box::new(CiscoIse::from_section(sec)?),
        "corelight" => Box::new(Corelight::from_section(sec, tagger)?),
        "persistent-buffer" => Box::new(PersistentBuffer::from_section(sec)?),
        "plugin" => Box::new(plugins.build(sec)?),
        _ => {
            return Err(ConfigError::UnknownKind {
                section: sec.name().to_string(),
                kind,
            })
        }
    };
    info!(preprocessor = sec.name(), kind = %kind, "built preprocessor");
    Ok(processor)
}

/// Builds an ordered set from named sections of a parsed config document.
pub fn build_set(
    cfg: &PipelineConfig,
    names: &[String],
    tagger: Arc<dyn Tagger>,
    plugins: &PluginRegistry,
    writer: Box<dyn EntryWriter>,
) -> Result<ProcessorSet, ConfigError> {
    let mut stages = Vec::with_capacity(names.len());
    for name in names {
        let sec = cfg.section(name).ok_or_else(|| {
            ConfigError::Parse(format!("no preprocessor section named {name:?}"))
        })?;
        stages.push(build_processor(sec, tagger.clone(), plugins)?);
    }
    Ok(ProcessorSet::new(stages, writer))
}
