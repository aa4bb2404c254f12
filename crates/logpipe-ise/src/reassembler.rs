//! Fragment table with latency- and pressure-driven eviction.

use crate::parser::Fragment;
use logpipe_core::Record;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const DEFAULT_MAX_BUFFER: usize = 8 * 1024 * 1024;
pub const DEFAULT_MAX_LATENCY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SequenceKey {
    host: String,
    category: String,
    id: u64,
}

/// One in-progress multipart message. `bodies` is exclusively owned here;
/// nothing hands out references into it.
struct MessageSequence {
    bodies: Vec<Option<String>>,
    populated: usize,
    /// Stored byte count: bodies plus the initial host and category.
    size: usize,
    /// Refreshed by every add that does not complete the sequence.
    last: Instant,
    /// The record that started the sequence; carried through to eject.
    meta: Record,
}

impl MessageSequence {
    fn merged(&self) -> String {
        let mut out = String::with_capacity(self.size);
        for body in self.bodies.iter().flatten() {
            out.push_str(body);
        }
        out
    }
}

/// A finalized sequence: the merged text plus the first fragment's record.
#[derive(Debug)]
pub struct Ejected {
    pub merged: String,
    pub meta: Record,
}

/// Result of feeding one fragment in. At most one of `Ejected`/`Bad`
/// applies.
pub enum AddOutcome {
    /// Stored; the sequence is still incomplete.
    Pending,
    /// This fragment completed the sequence.
    Ejected(Ejected),
    /// Counter out of range for the existing sequence.
    Bad,
}

/// The multipart fragment table.
///
/// Callers pass `now` explicitly; the reassembler keeps no clock of its
/// own, which keeps eviction deterministic under test.
pub struct Reassembler {
    table: HashMap<SequenceKey, MessageSequence>,
    /// Aggregate stored bytes across the table.
    total: usize,
    /// Smallest `last` across the table; maintained lazily by `flush`.
    oldest: Instant,
    max_buffer: usize,
    max_latency: Duration,
}

impl Reassembler {
    pub fn new(max_buffer: usize, max_latency: Duration, now: Instant) -> Self {
        Self {
            table: HashMap::new(),
            total: 0,
            oldest: now,
            max_buffer,
            max_latency,
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Aggregate stored bytes.
    pub fn stored_bytes(&self) -> usize {
        self.total
    }

    /// Feeds one fragment in. `rec` becomes the sequence meta when this
    /// fragment starts a new sequence; for follow-up fragments it is
    /// discarded (later fragments' enumerated values do not survive).
    pub fn add(&mut self, frag: &Fragment<'_>, rec: Record, now: Instant) -> AddOutcome {
        let key = SequenceKey {
            host: frag.host.to_string(),
            category: frag.category.to_string(),
            id: frag.msg_id,
        };

        if let Some(seq) = self.table.get_mut(&key) {
            if frag.seq as usize >= seq.bodies.len() {
                return AddOutcome::Bad;
            }
            if seq.bodies[frag.seq as usize].is_none() {
                seq.populated += 1;
            }
            seq.size += frag.body.len();
            self.total += frag.body.len();
            seq.bodies[frag.seq as usize] = Some(frag.body.to_string());

            let complete = seq.populated == seq.bodies.len();
            if !complete {
                seq.last = now;
                return AddOutcome::Pending;
            }

            let done = self.table.remove(&key).expect("sequence just updated");
            self.total = self.total.saturating_sub(done.size);
            if self.table.is_empty() {
                self.total = 0;
            }
            return AddOutcome::Ejected(Ejected {
                merged: done.merged(),
                meta: done.meta,
            });
        }

        if frag.total == 0 || frag.seq >= frag.total {
            return AddOutcome::Bad;
        }
        let mut bodies = vec![None; frag.total as usize];
        bodies[frag.seq as usize] = Some(frag.body.to_string());
        let size = frag.host.len() + frag.category.len() + frag.body.len();
        if self.table.is_empty() {
            self.oldest = now;
        }
        self.table.insert(
            key,
            MessageSequence {
                bodies,
                populated: 1,
                size,
                last: now,
                meta: rec,
            },
        );
        self.total += size;
        AddOutcome::Pending
    }

    /// True when the table needs a flush: aggregate bytes at the cap, or
    /// the oldest entry past the latency bound.
    pub fn should_flush(&self, now: Instant) -> bool {
        if self.total >= self.max_buffer {
            return true;
        }
        !self.max_latency.is_zero()
            && !self.table.is_empty()
            && now.duration_since(self.oldest) > self.max_latency
    }

    /// Evicts sequences: all of them under `force`, otherwise those idle
    /// past the latency bound. If the byte cap is still exceeded
    /// afterwards, the single stalest survivor goes too.
    pub fn flush(&mut self, force: bool, now: Instant) -> Vec<Ejected> {
        let cutoff = if self.max_latency.is_zero() {
            None
        } else {
            now.checked_sub(self.max_latency)
        };

        let victims: Vec<SequenceKey> = self
            .table
            .iter()
            .filter(|(_, seq)| force || matches!(cutoff, Some(c) if seq.last < c))
            .map(|(k, _)| k.clone())
            .collect();

        let mut out = Vec::with_capacity(victims.len());
        for key in victims {
            if let Some(seq) = self.table.remove(&key) {
                self.total = self.total.saturating_sub(seq.size);
                out.push(Ejected {
                    merged: seq.merged(),
                    meta: seq.meta,
                });
            }
        }

        // New oldest is the stalest survivor.
        match self.table.values().map(|s| s.last).min() {
            Some(min) => self.oldest = min,
            None => self.oldest = now,
        }

        // Still over the cap: evict the single stalest entry.
        if self.total >= self.max_buffer {
            if let Some(key) = self
                .table
                .iter()
                .min_by_key(|(_, s)| s.last)
                .map(|(k, _)| k.clone())
            {
                if let Some(seq) = self.table.remove(&key) {
                    self.total = self.total.saturating_sub(seq.size);
                    out.push(Ejected {
                        merged: seq.merged(),
                        meta: seq.meta,
                    });
                }
            }
        }

        if self.table.is_empty() {
            self.total = 0;
        }
        out
    }
}
