//! The forwarder processor and its network worker.

use crate::config::ForwarderConfig;
use crate::conn::{Breaker, Conn};
use crate::encode::Encoder;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use logpipe_config::{ConfigError, KvSection};
use logpipe_core::{ProcessError, Processor, Record, Tag, Tagger};
use regex::bytes::Regex;
use std::collections::HashSet;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

const RECONNECT_INTERVAL: Duration = Duration::from_secs(1);

struct Filters {
    tags: HashSet<Tag>,
    sources: Vec<ipnet::IpNet>,
    regexes: Vec<Regex>,
}

impl Filters {
    fn build(
        sec_name: &str,
        cfg: &ForwarderConfig,
        tagger: &dyn Tagger,
    ) -> Result<Self, ConfigError> {
        let mut tags = HashSet::new();
        for name in &cfg.tag_filters {
            let tag = tagger
                .negotiate(name)
                .map_err(|e| ConfigError::build(sec_name, e.to_string()))?;
            tags.insert(tag);
        }
        let mut regexes = Vec::new();
        for raw in &cfg.regex_filters {
            regexes.push(
                Regex::new(raw)
                    .map_err(|e| ConfigError::build(sec_name, format!("bad regex: {e}")))?,
            );
        }
        Ok(Self {
            tags,
            sources: cfg.source_filters.clone(),
            regexes,
        })
    }

    fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.sources.is_empty() && self.regexes.is_empty()
    }

    /// With any filter configured, a record must match at least one.
    fn admits(&self, rec: &Record) -> bool {
        if self.is_empty() {
            return true;
        }
        self.tags.contains(&rec.tag)
            || self.sources.iter().any(|n| n.contains(&rec.src))
            || self.regexes.iter().any(|re| re.is_match(&rec.data))
    }
}

/// Duplicates matching records to a remote endpoint; the main pipeline sees
/// its batches unchanged.
pub struct Forwarder {
    tx: Option<Sender<Record>>,
    abort_tx: Option<Sender<()>>,
    abort_rx: Receiver<()>,
    done_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
    breaker: Arc<Mutex<Option<Breaker>>>,
    filters: Filters,
    non_blocking: bool,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(
        name: &str,
        cfg: ForwarderConfig,
        tagger: Arc<dyn Tagger>,
    ) -> Result<Self, ConfigError> {
        let filters = Filters::build(name, &cfg, tagger.as_ref())?;

        // In blocking mode an unreachable target is a configuration-time
        // failure; in non-blocking mode the worker keeps retrying.
        eprintln!("DEBUG: new, dialing target={}", cfg.target);
        let initial = if cfg.non_blocking {
            None
        } else {
            Some(
                Conn::dial(&cfg)
                    .map_err(|e| ConfigError::build(name, format!("dial {}: {e}", cfg.target)))?,
            )
        };
        eprintln!("DEBUG: dial done");

        let (tx, rx) = bounded::<Record>(cfg.buffer.max(1));
        let (abort_tx, abort_rx) = bounded::<()>(0);
        let (done_tx, done_rx) = bounded::<()>(0);
        let breaker = Arc::new(Mutex::new(None));

        let worker = Worker {
            cfg: cfg.clone(),
            rx,
            abort_rx: abort_rx.clone(),
            _done_tx: done_tx,
            breaker: breaker.clone(),
            encoder: Encoder::new(cfg.format, cfg.delimiter.clone(), tagger),
        };
        let handle = std::thread::Builder::new()
            .name(format!("logpipe-forward-{name}"))
            .spawn(move || worker.run(initial))
            .map_err(|e| ConfigError::build(name, format!("spawn worker: {e}")))?;

        Ok(Self {
            tx: Some(tx),
            abort_tx: Some(abort_tx),
            abort_rx,
            done_rx,
            handle: Some(handle),
            breaker,
            filters,
            non_blocking: cfg.non_blocking,
            timeout: cfg.timeout,
        })
    }

    pub fn from_section(sec: &KvSection, tagger: Arc<dyn Tagger>) -> Result<Self, ConfigError> {
        Self::new(sec.name(), ForwarderConfig::load(sec)?, tagger)
    }

    /// The `gravwellforwarder` kind.
    pub fn gravwell_from_section(
        sec: &KvSection,
        tagger: Arc<dyn Tagger>,
    ) -> Result<Self, ConfigError> {
        Self::new(sec.name(), ForwarderConfig::load_gravwell(sec)?, tagger)
    }

    fn enqueue(&self, rec: Record) {
        let Some(tx) = &self.tx else {
            return;
        };
        if self.non_blocking {
            match tx.try_send(rec) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => {}
                Err(TrySendError::Full(_)) => {
                    debug!("forwarder queue full, dropping record");
                }
            }
            return;
        }
        // Blocking mode: wait for queue space or the shutdown signal.
        crossbeam_channel::select! {
            send(tx, rec) -> res => {
                let _ = res;
            }
            recv(self.abort_rx) -> _ => {}
        }
    }
}

impl Processor for Forwarder {
    fn process(&mut self, batch: Vec<Record>) -> Result<Vec<Record>, ProcessError> {
        for rec in &batch {
            if self.filters.admits(rec) {
                self.enqueue(rec.clone());
            }
        }
        Ok(batch)
    }

    fn close(&mut self) -> Result<(), ProcessError> {
        // Closing the data channel lets the worker drain what is queued;
        // the worker signals completion by dropping its side of `done`.
        drop(self.tx.take());

        let drained = !matches!(
            self.done_rx.recv_timeout(self.timeout),
            Err(crossbeam_channel::RecvTimeoutError::Timeout)
        );
        if !drained {
            warn!("forwarder drain timed out, breaking connection");
            drop(self.abort_tx.take());
            if let Some(b) = self.breaker.lock().unwrap_or_else(|e| e.into_inner()).take() {
                b.shutdown();
            }
        } else {
            drop(self.abort_tx.take());
        }

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                return Err(ProcessError::other("forwarder worker panicked"));
            }
        }
        Ok(())
    }
}

impl Drop for Forwarder {
    fn drop(&mut self) {
        drop(self.tx.take());
        drop(self.abort_tx.take());
        if let Some(b) = self.breaker.lock().unwrap_or_else(|e| e.into_inner()).take() {
            b.shutdown();
        }
    }
}

struct Worker {
    cfg: ForwarderConfig,
    rx: Receiver<Record>,
    abort_rx: Receiver<()>,
    /// Dropped on exit; the closer's recv observes the drain.
    _done_tx: Sender<()>,
    breaker: Arc<Mutex<Option<Breaker>>>,
    encoder: Encoder,
}

impl Worker {
    fn run(mut self, initial: Option<Conn>) {
        eprintln!("DEBUG: worker run start, initial.is_some()={}", initial.is_some());
        let mut next = initial;
        loop {
            let conn = match next.take() {
                Some(conn) => conn,
                None => match self.reconnect() {
                    Some(conn) => conn,
                    None => { eprintln!("DEBUG: reconnect returned None, exiting"); return; },
                },
            };
            eprintln!("DEBUG: got conn, entering pump");
            info!(target = %self.cfg.target, "forwarder connected");
            *self.breaker.lock().unwrap_or_else(|e| e.into_inner()) = conn.breaker();

            if self.pump(conn) {
                return;
            }
            *self.breaker.lock().unwrap_or_else(|e| e.into_inner()) = None;
        }
    }

    /// Dials until it succeeds or shutdown is signalled.
    fn reconnect(&self) -> Option<Conn> {
        loop {
            match Conn::dial(&self.cfg) {
                Ok(conn) => return Some(conn),
                Err(e) => {
                    warn!(target = %self.cfg.target, error = %e, "forwarder dial failed");
                    match self.abort_rx.recv_timeout(RECONNECT_INTERVAL) {
                        Ok(()) | Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                            return None
                        }
                        Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                    }
                }
            }
        }
    }

    /// Streams records until done (true) or the connection dies (false).
    fn pump(&mut self, mut conn: Conn) -> bool {
        loop {
            eprintln!("DEBUG: pump loop select");
            crossbeam_channel::select! {
                recv(self.rx) -> msg => match msg {
                    Ok(rec) => {
                        eprintln!("DEBUG: got rec, writing");
                        let frame = self.encoder.encode(&rec);
                        if let Err(e) = conn.write_all(frame) {
                            warn!(error = %e, "forwarder write failed, reconnecting");
                            return false;
                        }
                        eprintln!("DEBUG: write done");
                    }
                    // Channel closed and fully drained.
                    Err(_) => {
                        eprintln!("DEBUG: rx closed, flushing and returning true");
                        let _ = conn.flush();
                        return true;
                    }
                },
                recv(self.abort_rx) -> _ => { eprintln!("DEBUG: abort received"); return true; },
            }
        }
    }
}
