//! The cisco_ise processor: reassembly plus re-emission.

use crate::message::{parse_message, render_cef, render_json, AttributeOptions, OutputFormat};
use crate::parser::{parse_header, HeaderError};
use crate::reassembler::{AddOutcome, Ejected, Reassembler, DEFAULT_MAX_BUFFER, DEFAULT_MAX_LATENCY};
use logpipe_config::{duration_of, size_of, ConfigError, KvSection};
use logpipe_core::{ProcessError, Processor, Record};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug)]
pub struct CiscoIseConfig {
    pub enable_multipart_reassembly: bool,
    pub output_format: OutputFormat,
    pub max_multipart_buffer: usize,
    pub max_multipart_latency: Duration,
    pub attributes: AttributeOptions,
}

impl Default for CiscoIseConfig {
    fn default() -> Self {
        Self {
            enable_multipart_reassembly: false,
            output_format: OutputFormat::Raw,
            max_multipart_buffer: DEFAULT_MAX_BUFFER,
            max_multipart_latency: DEFAULT_MAX_LATENCY,
            attributes: AttributeOptions::default(),
        }
    }
}

impl CiscoIseConfig {
    pub fn load(sec: &KvSection) -> Result<Self, ConfigError> {
        let output_format = match sec.get_string("Output-Format") {
            Some(raw) => OutputFormat::parse(&raw)
                .map_err(|e| ConfigError::bad_value(sec.name(), "Output-Format", e))?,
            None => OutputFormat::Raw,
        };
        Ok(Self {
            enable_multipart_reassembly: sec.get_bool("Enable-Multipart-Reassembly", false)?,
            output_format,
            max_multipart_buffer: size_of(sec, "Max-Multipart-Buffer")?
                .map(|v| v as usize)
                .unwrap_or(DEFAULT_MAX_BUFFER),
            max_multipart_latency: duration_of(sec, "Max-Multipart-Latency")?
                .unwrap_or(DEFAULT_MAX_LATENCY),
            attributes: AttributeOptions::load(sec)?,
        })
    }
}

/// Reassembles multipart ISE traffic and re-emits merged messages in the
/// configured format.
///
/// Eviction is coupled to ingress: the flush predicate is checked after
/// every batch, so an idle stream holds its half-finished sequences until
/// shutdown. That matches the upstream behaviour this processor mirrors.
pub struct CiscoIse {
    reassemble: bool,
    format: OutputFormat,
    attrs: AttributeOptions,
    table: Reassembler,
}

impl CiscoIse {
    pub fn new(cfg: CiscoIseConfig) -> Self {
        Self {
            reassemble: cfg.enable_multipart_reassembly,
            format: cfg.output_format,
            attrs: cfg.attributes,
            table: Reassembler::new(
                cfg.max_multipart_buffer,
                cfg.max_multipart_latency,
                Instant::now(),
            ),
        }
    }

    pub fn from_section(sec: &KvSection) -> Result<Self, ConfigError> {
        Ok(Self::new(CiscoIseConfig::load(sec)?))
    }

    /// Renders a merged message. Raw emits as received; CEF/JSON fall back
    /// to the merged text when the inner grammar does not apply.
    fn render(&self, merged: &str) -> Vec<u8> {
        match self.format {
            OutputFormat::Raw => merged.as_bytes().to_vec(),
            OutputFormat::Cef | OutputFormat::Json => match parse_message(merged) {
                Some(msg) => match self.format {
                    OutputFormat::Cef => render_cef(&msg, &self.attrs),
                    _ => render_json(&msg, &self.attrs),
                },
                None => merged.as_bytes().to_vec(),
            },
        }
    }

    fn finish(&self, ejected: Ejected) -> Record {
        let mut rec = ejected.meta;
        rec.data = self.render(&ejected.merged);
        rec
    }

    /// Batch processing with an injectable clock; the trait entry point
    /// passes `Instant::now()`.
    fn process_at(&mut self, batch: Vec<Record>, now: Instant) -> Vec<Record> {
        let mut out = Vec::with_capacity(batch.len());
        for mut rec in batch {
            if !self.reassemble {
                let rendered = match std::str::from_utf8(&rec.data) {
                    Ok(text) => self.render(text),
                    Err(_) => {
                        out.push(rec);
                        continue;
                    }
                };
                rec.data = rendered;
                out.push(rec);
                continue;
            }

            // The fragment borrows rec.data, so resolve the table outcome
            // (which owns its contents) before deciding what to do with rec.
            let outcome = match std::str::from_utf8(&rec.data)
                .map_err(|_| HeaderError::InvalidHeader)
                .and_then(parse_header)
            {
                Ok(frag) => Some(self.table.add(&frag, rec.clone(), now)),
                // Not multipart traffic; pass it through untouched.
                Err(HeaderError::InvalidHeader) => None,
                Err(HeaderError::InvalidSequence) => {
                    debug!("dropping fragment with invalid sequence counter");
                    continue;
                }
            };
            match outcome {
                None => out.push(rec),
                Some(AddOutcome::Pending) => {}
                Some(AddOutcome::Bad) => {
                    debug!("dropping fragment outside its sequence bounds");
                }
                Some(AddOutcome::Ejected(e)) => out.push(self.finish(e)),
            }
        }

        if self.reassemble && self.table.should_flush(now) {
            for e in self.table.flush(false, now) {
                out.push(self.finish(e));
            }
        }
        out
    }

    #[cfg(test)]
    pub(crate) fn process_with_clock(&mut self, batch: Vec<Record>, now: Instant) -> Vec<Record> {
        self.process_at(batch, now)
    }
}

impl Processor for CiscoIse {
    fn process(&mut self, batch: Vec<Record>) -> Result<Vec<Record>, ProcessError> {
        Ok(self.process_at(batch, Instant::now()))
    }

    fn flush(&mut self) -> Vec<Record> {
        self.table
            .flush(true, Instant::now())
            .into_iter()
            .map(|e| self.finish(e))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logpipe_core::{EnumeratedValue, Tag, Timestamp};

    fn rec(line: &str) -> Record {
        Record::with_data(Tag(1), Timestamp::new(100, 0), line.as_bytes().to_vec())
    }

    fn frag_line(id: u64, total: u32, seq: u32, body: &str) -> String {
        format!("Jun 12 10:41:06 ISE_DEVICE CISE_Passed_Authentications {id} {total} {seq} {body}")
    }

    fn reassembling(format: OutputFormat) -> CiscoIse {
        CiscoIse::new(CiscoIseConfig {
            enable_multipart_reassembly: true,
            output_format: format,
            max_multipart_latency: Duration::from_secs(60),
            ..CiscoIseConfig::default()
        })
    }

    #[test]
    fn test_eject_on_final_fragment() {
        let mut p = reassembling(OutputFormat::Raw);
        let now = Instant::now();
        let bodies = ["one ", "two ", "three ", "four ", "five"];
        let mut out = Vec::new();
        for (i, b) in bodies.iter().enumerate() {
            out = p.process_with_clock(vec![rec(&frag_line(983328, 5, i as u32, b))], now);
            if i < 4 {
                assert!(out.is_empty(), "premature output at fragment {i}");
            }
        }
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data, b"one two three four five");
        // Tag, source, timestamp come from the first fragment's record.
        assert_eq!(out[0].tag, Tag(1));
        assert_eq!(out[0].ts, Timestamp::new(100, 0));
    }

    #[test]
    fn test_first_fragment_evs_survive_eject() {
        let mut p = reassembling(OutputFormat::Raw);
        let now = Instant::now();
        let mut first = rec(&frag_line(1, 2, 0, "a"));
        first.add_ev(EnumeratedValue::string("listener", "udp514"));
        assert!(p.process_with_clock(vec![first], now).is_empty());

        let mut second = rec(&frag_line(1, 2, 1, "b"));
        second.add_ev(EnumeratedValue::string("listener", "tcp601"));
        let out = p.process_with_clock(vec![second], now);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].evs.len(), 1);
        assert_eq!(
            out[0].evs[0].value,
            logpipe_core::EvValue::String("udp514".into())
        );
    }

    #[test]
    fn test_stray_fragment_latency_flush() {
        let mut p = reassembling(OutputFormat::Raw);
        let base = Instant::now();
        // Complete four-fragment sequence plus an independent stray.
        for i in 0..4u32 {
            p.process_with_clock(vec![rec(&frag_line(983330, 4, i, "x"))], base);
        }
        let out = p.process_with_clock(vec![rec(&frag_line(983331, 2, 0, "stray-body"))], base);
        assert!(out.is_empty());

        // Ten simulated minutes later the next (empty) batch triggers the
        // latency flush.
        let later = base + Duration::from_secs(600);
        let out = p.process_with_clock(Vec::new(), later);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data, b"stray-body");
    }

    #[test]
    fn test_non_multipart_passes_through() {
        let mut p = reassembling(OutputFormat::Raw);
        let out = p.process_with_clock(vec![rec("ordinary syslog line")], Instant::now());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data, b"ordinary syslog line");
    }

    #[test]
    fn test_invalid_sequence_drops() {
        let mut p = reassembling(OutputFormat::Raw);
        let out = p.process_with_clock(vec![rec(&frag_line(9, 3, 4, "x"))], Instant::now());
        assert!(out.is_empty());
    }

    #[test]
    fn test_shutdown_flush_formats_partials() {
        let mut p = reassembling(OutputFormat::Raw);
        p.process_with_clock(vec![rec(&frag_line(5, 3, 0, "partial"))], Instant::now());
        let out = p.flush();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data, b"partial");
        assert!(p.flush().is_empty());
    }

    #[test]
    fn test_reassembly_disabled_renders_inner_message() {
        let mut p = CiscoIse::new(CiscoIseConfig {
            output_format: OutputFormat::Json,
            ..CiscoIseConfig::default()
        });
        let inner = "2020-06-12 10:41:06.420 +00:00 7 ODE NOTICE Cls: hello, K=v";
        let out = p.process(vec![rec(inner)]).unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&out[0].data).unwrap();
        assert_eq!(doc["Class"], "Cls");
        assert_eq!(doc["Attributes"]["K"], "v");
    }

    #[test]
    fn test_cef_output_after_reassembly() {
        let mut p = reassembling(OutputFormat::Cef);
        let now = Instant::now();
        let part0 = "2020-06-12 10:41:06 7 ODE NOTICE Cls: merged ";
        let part1 = "text, K=v";
        p.process_with_clock(vec![rec(&frag_line(2, 2, 0, part0))], now);
        let out = p.process_with_clock(vec![rec(&frag_line(2, 2, 1, part1))], now);
        assert_eq!(out.len(), 1);
        let text = String::from_utf8(out[0].data.clone()).unwrap();
        assert!(text.starts_with("CEF:0|CISCO|ISE_DEVICE|||Cls|NOTICE|"), "{text}");
        assert!(text.contains("text=merged text"));
        assert!(text.ends_with("K=v"));
    }
}
